//! Run settings, loadable from a JSON file.
//!
//! Defaults query `cpu`/`usage_system` from `my-bucket` over the last day on
//! a local server, keep the `cpu0` series and print the first 20 records.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::flux::{Flux, RangeBound, Restriction};
use crate::query::Query;
use crate::runner::{DEFAULT_LIMIT, QueryRunner, RecordFilter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub url: String,
    pub token: String,
    pub org: String,
    /// Raw Flux text. When set, the bucket/range/measurement/field settings
    /// are ignored.
    pub query: Option<String>,
    pub bucket: String,
    pub range_start: String,
    pub measurement: Option<String>,
    pub field: Option<String>,
    pub filter_key: Option<String>,
    pub filter_value: Option<String>,
    /// `null` consumes the whole result.
    pub limit: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: "http://localhost:9999".to_string(),
            token: "my-token".to_string(),
            org: "my-org".to_string(),
            query: None,
            bucket: "my-bucket".to_string(),
            range_start: "-1d".to_string(),
            measurement: Some("cpu".to_string()),
            field: Some("usage_system".to_string()),
            filter_key: Some("cpu".to_string()),
            filter_value: Some("cpu0".to_string()),
            limit: Some(DEFAULT_LIMIT),
            timeout_secs: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// The query to submit: the raw text if given, otherwise one built from
    /// the bucket, range and restriction settings.
    pub fn query(&self) -> Result<Query> {
        if let Some(text) = self.query.as_deref().filter(|q| !q.trim().is_empty()) {
            return Ok(Query::new(text, self.org.clone()));
        }

        let mut flux = Flux::from_bucket(&self.bucket).range(RangeBound::parse(&self.range_start)?);
        let restriction = [
            self.measurement.as_deref().map(|m| Restriction::measurement().equal(m)),
            self.field.as_deref().map(|f| Restriction::field().equal(f)),
        ]
        .into_iter()
        .flatten()
        .reduce(Restriction::and);
        if let Some(restriction) = restriction {
            flux = flux.filter(restriction);
        }

        Ok(Query::new(flux.to_string(), self.org.clone()))
    }

    pub fn runner(&self) -> Result<QueryRunner> {
        let mut runner = QueryRunner::new();
        runner = match self.limit {
            Some(0) => return Err(Error::Config("limit must be at least 1".to_string())),
            Some(limit) => runner.with_limit(limit),
            None => runner.unbounded(),
        };
        match (&self.filter_key, &self.filter_value) {
            (Some(key), Some(value)) => Ok(runner.with_filter(RecordFilter::new(key, value))),
            (None, None) => Ok(runner),
            _ => Err(Error::Config(
                "filter key and filter value must be given together".to_string(),
            )),
        }
    }

    /// Acquire the client handle these settings describe.
    pub fn client(&self) -> Result<Client> {
        let mut builder = Client::builder(&self.url, &self.token).org(&self.org);
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_query_matches_cpu_example() {
        let query = Config::default().query().unwrap();
        assert_eq!(query.org(), "my-org");
        assert_eq!(
            query.text(),
            "from(bucket: \"my-bucket\")\n\
             \t|> range(start: -1d)\n\
             \t|> filter(fn: (r) => (r[\"_measurement\"] == \"cpu\" and r[\"_field\"] == \"usage_system\"))"
        );
    }

    #[test]
    fn test_default_runner() {
        let runner = Config::default().runner().unwrap();
        assert_eq!(runner.limit(), Some(20));
        assert_eq!(runner.filter(), Some(&RecordFilter::new("cpu", "cpu0")));
    }

    #[test]
    fn test_raw_query_wins() {
        let config = Config {
            query: Some("buckets()".to_string()),
            ..Config::default()
        };
        assert_eq!(config.query().unwrap().text(), "buckets()");
    }

    #[test]
    fn test_single_restriction_is_not_wrapped() {
        let config = Config {
            field: None,
            ..Config::default()
        };
        assert!(
            config
                .query()
                .unwrap()
                .text()
                .ends_with("filter(fn: (r) => r[\"_measurement\"] == \"cpu\")")
        );
    }

    #[test]
    fn test_half_filter_is_rejected() {
        let config = Config {
            filter_value: None,
            ..Config::default()
        };
        assert_eq!(config.runner().unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let config = Config {
            limit: Some(0),
            ..Config::default()
        };
        assert!(matches!(config.runner(), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_token_fails_connection() {
        let config = Config {
            token: String::new(),
            ..Config::default()
        };
        assert_eq!(config.client().unwrap_err().kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"url": "http://influx:8086", "limit": null, "filter_key": null, "filter_value": null}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.url, "http://influx:8086");
        assert_eq!(config.bucket, "my-bucket");

        let runner = config.runner().unwrap();
        assert_eq!(runner.limit(), None);
        assert!(runner.filter().is_none());
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bukket": "typo"}}"#).unwrap();
        assert_eq!(
            Config::from_file(file.path()).unwrap_err().kind(),
            ErrorKind::Config
        );
    }
}
