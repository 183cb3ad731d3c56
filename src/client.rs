//! InfluxDB 2.x query client.
//!
//! [`Client`] is the handle the runner acquires: it owns an HTTP connection
//! pool bound to one server and one token, executes Flux queries against
//! `/api/v2/query`, and decodes the annotated CSV response as a stream.

use std::time::Duration;

use async_stream::stream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, Url};
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::parser::AnnotatedCsvParser;
use crate::query::{Query, QuerySource, RecordStream};
use crate::record::Record;

/// Handle to an InfluxDB 2.x server.
///
/// ```ignore
/// use flux_query_runner::{Client, Query};
/// use futures::StreamExt;
///
/// let client = Client::new("http://localhost:8086", "my-token")?;
/// let query = Query::new(r#"from(bucket: "sensors") |> range(start: -1h)"#, "my-org");
///
/// let mut stream = client.query_stream(&query).await?;
/// while let Some(record) = stream.next().await {
///     println!("{:?}", record?.value());
/// }
/// client.close();
/// ```
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    org: Option<String>,
}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    url: String,
    token: String,
    org: Option<String>,
    timeout: Option<Duration>,
    http: Option<reqwest::Client>,
}

/// Body of a `/api/v2/query` request.
#[derive(Debug, Serialize)]
struct QueryPayload<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    query_type: &'static str,
    dialect: QueryDialect,
}

/// Annotated CSV dialect requested from the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryDialect {
    annotations: [&'static str; 3],
    comment_prefix: &'static str,
    date_time_format: &'static str,
    delimiter: &'static str,
    header: bool,
}

impl Default for QueryDialect {
    fn default() -> Self {
        Self {
            annotations: ["datatype", "group", "default"],
            comment_prefix: "#",
            date_time_format: "RFC3339",
            delimiter: ",",
            header: true,
        }
    }
}

/// JSON body InfluxDB sends with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ClientBuilder {
    /// Organization used for queries that do not name one.
    pub fn org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }

    /// Total timeout for each request, including reading the response body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a preconfigured reqwest client (proxies, TLS roots, ...).
    ///
    /// Overrides [`timeout`](Self::timeout).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<Client> {
        if self.url.trim().is_empty() {
            return Err(Error::Connection(
                "server address must not be empty".to_string(),
            ));
        }
        if self.token.is_empty() {
            return Err(Error::Connection("token must not be empty".to_string()));
        }

        let base_url = Url::parse(&self.url).map_err(|e| {
            Error::Connection(format!("invalid InfluxDB URL '{}': {}", self.url, e))
        })?;

        let http = match self.http {
            Some(http) => http,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build().map_err(|e| {
                    Error::Connection(format!("failed to build HTTP client: {}", e))
                })?
            }
        };

        debug!(url = %base_url, "created InfluxDB client");
        Ok(Client {
            http,
            base_url,
            token: self.token,
            org: self.org.filter(|o| !o.is_empty()),
        })
    }
}

impl Client {
    /// Create a client for `url` authenticating with `token`.
    ///
    /// Fails with [`Error::Connection`] if either is empty or the URL does
    /// not parse.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::builder(url, token).build()
    }

    pub fn builder(url: impl Into<String>, token: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            url: url.into(),
            token: token.into(),
            org: None,
            timeout: None,
            http: None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.base_url
    }

    /// Default organization, if one was configured.
    pub fn org(&self) -> Option<&str> {
        self.org.as_deref()
    }

    /// `path` appended to the base URL's own path, so servers mounted under
    /// a prefix (`http://proxy/influx`) keep it.
    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(None);
        url
    }

    fn resolve_org<'a>(&'a self, query: &'a Query) -> Result<&'a str> {
        if !query.org().is_empty() {
            return Ok(query.org());
        }
        self.org.as_deref().ok_or_else(|| Error::Query {
            status: None,
            message: "no organization given for query".to_string(),
            reference: None,
        })
    }

    /// POST the query and return the response once its status is known good.
    async fn submit(&self, query: &Query) -> Result<Response> {
        let org = self.resolve_org(query)?;
        let endpoint = self.endpoint("/api/v2/query");
        let body = serde_json::to_string(&QueryPayload {
            query: query.text(),
            query_type: "flux",
            dialect: QueryDialect::default(),
        })?;

        debug!(%endpoint, org, "submitting flux query");
        let response = self
            .http
            .post(endpoint)
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(ACCEPT, "application/csv")
            .header(CONTENT_TYPE, "application/json")
            .query(&[("org", org)])
            .body(body)
            .send()
            .await?;

        check_status(response).await
    }

    /// Execute a Flux query and stream its records.
    ///
    /// Records are decoded as the response body arrives; dropping the stream
    /// drops the response. The stream yields at most one error, as its last
    /// item.
    pub async fn query_stream(&self, query: &Query) -> Result<RecordStream> {
        let response = self.submit(query).await?;

        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        let mut parser = AnnotatedCsvParser::new(reader);

        let s = stream! {
            loop {
                match parser.next().await {
                    Ok(Some(record)) => yield Ok(record),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(s))
    }

    /// Execute a Flux query and collect every record.
    ///
    /// Holds the whole result in memory; prefer [`query_stream`](Self::query_stream)
    /// for large results.
    pub async fn query(&self, query: &Query) -> Result<Vec<Record>> {
        let mut stream = self.query_stream(query).await?;
        let mut records = Vec::new();
        while let Some(item) = stream.next().await {
            records.push(item?);
        }
        Ok(records)
    }

    /// Execute a Flux query and return the undecoded annotated CSV body.
    pub async fn query_raw(&self, query: &Query) -> Result<String> {
        let response = self.submit(query).await?;
        // body failures are stream failures, as in query_stream
        response
            .text()
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))
    }

    /// Release the handle and its connection pool.
    pub fn close(self) {
        info!(url = %self.base_url, "closing InfluxDB client");
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.base_url.as_str())
            .field("org", &self.org)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl QuerySource for Client {
    async fn query_stream(&self, query: &Query) -> Result<RecordStream> {
        Client::query_stream(self, query).await
    }

    fn close(self) {
        Client::close(self)
    }
}

/// Turn a non-2xx response into [`Error::Query`], using the server's JSON
/// error message when there is one.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            }
        });

    Err(Error::Query {
        status: Some(status.as_u16()),
        message,
        reference: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_new_rejects_empty_address() {
        let err = Client::new("", "my-token").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_new_rejects_empty_token() {
        let err = Client::new("http://localhost:8086", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let err = Client::new("not a url", "my-token").unwrap_err();
        assert!(matches!(err, Error::Connection(ref m) if m.contains("not a url")));
    }

    #[test]
    fn test_builder_keeps_org() {
        let client = Client::builder("http://localhost:8086", "t")
            .org("my-org")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(client.org(), Some("my-org"));
        assert_eq!(client.url().as_str(), "http://localhost:8086/");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = Client::new("http://localhost:8086", "t").unwrap();
        assert_eq!(
            client.endpoint("/api/v2/query").as_str(),
            "http://localhost:8086/api/v2/query"
        );

        for base in ["http://proxy.local/influx", "http://proxy.local/influx/"] {
            let client = Client::new(base, "t").unwrap();
            assert_eq!(
                client.endpoint("/api/v2/query").as_str(),
                "http://proxy.local/influx/api/v2/query"
            );
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = Client::new("http://localhost:8086", "secret-token").unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_payload_shape() {
        let payload = QueryPayload {
            query: "from(bucket: \"b\")",
            query_type: "flux",
            dialect: QueryDialect::default(),
        };
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "flux");
        assert_eq!(json["query"], "from(bucket: \"b\")");
        assert_eq!(json["dialect"]["commentPrefix"], "#");
        assert_eq!(json["dialect"]["dateTimeFormat"], "RFC3339");
        assert_eq!(
            json["dialect"]["annotations"],
            serde_json::json!(["datatype", "group", "default"])
        );
        assert_eq!(json["dialect"]["header"], true);
    }

    #[test]
    fn test_query_without_org_fails() {
        let client = Client::new("http://localhost:8086", "t").unwrap();
        let err = client.resolve_org(&Query::new("q", "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);

        let client = Client::builder("http://localhost:8086", "t")
            .org("fallback")
            .build()
            .unwrap();
        assert_eq!(client.resolve_org(&Query::new("q", "")).unwrap(), "fallback");
        assert_eq!(client.resolve_org(&Query::new("q", "mine")).unwrap(), "mine");
    }
}
