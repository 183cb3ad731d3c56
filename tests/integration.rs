//! Integration tests against a live InfluxDB 2.x.
//!
//! Start one with:
//!
//! ```bash
//! docker run -d -p 8086:8086 \
//!     -e DOCKER_INFLUXDB_INIT_MODE=setup \
//!     -e DOCKER_INFLUXDB_INIT_USERNAME=admin \
//!     -e DOCKER_INFLUXDB_INIT_PASSWORD=admin-password \
//!     -e DOCKER_INFLUXDB_INIT_ORG=test-org \
//!     -e DOCKER_INFLUXDB_INIT_BUCKET=test-bucket \
//!     -e DOCKER_INFLUXDB_INIT_ADMIN_TOKEN=test-token-for-development-only \
//!     influxdb:2
//! ```
//!
//! Every test returns early when the server is not reachable.

use std::time::Duration;

use flux_query_runner::{
    Client, ErrorKind, Flux, Query, QueryRunner, RangeBound, RecordFilter, Restriction,
};
use futures::StreamExt;
use serial_test::serial;

const INFLUXDB_URL: &str = "http://localhost:8086";
const INFLUXDB_ORG: &str = "test-org";
const INFLUXDB_TOKEN: &str = "test-token-for-development-only";
const INFLUXDB_BUCKET: &str = "test-bucket";

async fn influxdb_available() -> bool {
    reqwest::Client::new()
        .get(format!("{}/health", INFLUXDB_URL))
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}

async fn write_lines(lines: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!(
        "{}/api/v2/write?org={}&bucket={}&precision=ms",
        INFLUXDB_URL, INFLUXDB_ORG, INFLUXDB_BUCKET
    );
    let response = reqwest::Client::new()
        .post(&url)
        .header("Authorization", format!("Token {}", INFLUXDB_TOKEN))
        .header("Content-Type", "text/plain")
        .body(lines.to_string())
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await?;
        return Err(format!("Write failed: {} - {}", status, body).into());
    }
    Ok(())
}

async fn clear_bucket() -> Result<(), Box<dyn std::error::Error>> {
    let url = format!(
        "{}/api/v2/delete?org={}&bucket={}",
        INFLUXDB_URL, INFLUXDB_ORG, INFLUXDB_BUCKET
    );
    reqwest::Client::new()
        .post(&url)
        .header("Authorization", format!("Token {}", INFLUXDB_TOKEN))
        .json(&serde_json::json!({
            "start": "1970-01-01T00:00:00Z",
            "stop": "2100-01-01T00:00:00Z"
        }))
        .send()
        .await?;
    Ok(())
}

/// `count` usage_system points alternating between cpu0 and cpu1, one
/// second apart, with value equal to the point index.
fn cpu_lines(count: usize) -> String {
    let base_ts = 1_700_000_000_000i64;
    (0..count)
        .map(|i| {
            format!(
                "cpu,cpu=cpu{},host=server0 usage_system={} {}",
                i % 2,
                i,
                base_ts + i as i64 * 1000
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn cpu_query() -> Query {
    let flux = Flux::from_bucket(INFLUXDB_BUCKET)
        .range(RangeBound::parse("2023-01-01T00:00:00Z").unwrap())
        .filter(
            Restriction::measurement()
                .equal("cpu")
                .and(Restriction::field().equal("usage_system")),
        );
    Query::new(flux.to_string(), INFLUXDB_ORG)
}

async fn seed(count: usize) {
    clear_bucket().await.unwrap();
    write_lines(&cpu_lines(count)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
}

#[tokio::test]
#[serial]
async fn test_stream_returns_all_points() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }
    seed(100).await;

    let client = Client::new(INFLUXDB_URL, INFLUXDB_TOKEN).unwrap();
    let mut stream = client.query_stream(&cpu_query()).await.unwrap();

    let mut count = 0;
    while let Some(result) = stream.next().await {
        let record = result.expect("Failed to parse record");
        assert_eq!(record.measurement(), Some("cpu"));
        assert!(record.time().is_some());
        count += 1;
    }
    assert_eq!(count, 100);
    client.close();
}

#[tokio::test]
#[serial]
async fn test_runner_prints_first_twenty_cpu0() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }
    seed(100).await;

    let client = Client::new(INFLUXDB_URL, INFLUXDB_TOKEN).unwrap();
    let mut out = Vec::new();
    let summary = QueryRunner::new()
        .with_filter(RecordFilter::new("cpu", "cpu0"))
        .with_limit(20)
        .run(client, &cpu_query(), &mut out)
        .await
        .unwrap();

    let out = String::from_utf8(out).unwrap();
    assert_eq!(summary.printed, 20);
    // cpu0 holds the even indices, in time order
    let expected: Vec<String> = (0..20)
        .map(|i| format!("Measurement: cpu, value: {}", i * 2))
        .collect();
    assert_eq!(out.lines().collect::<Vec<_>>(), expected);
}

#[tokio::test]
#[serial]
async fn test_runner_empty_result() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }
    clear_bucket().await.unwrap();

    let client = Client::new(INFLUXDB_URL, INFLUXDB_TOKEN).unwrap();
    let mut out = Vec::new();
    let summary = QueryRunner::new()
        .with_filter(RecordFilter::new("cpu", "cpu0"))
        .run(client, &cpu_query(), &mut out)
        .await
        .unwrap();

    assert_eq!(summary.printed, 0);
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_invalid_flux_is_query_error() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    let client = Client::new(INFLUXDB_URL, INFLUXDB_TOKEN).unwrap();
    let mut out = Vec::new();
    let err = QueryRunner::new()
        .run(
            client,
            &Query::new("this is not valid flux", INFLUXDB_ORG),
            &mut out,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Query);
}

#[tokio::test]
async fn test_bad_token_is_query_error() {
    if !influxdb_available().await {
        eprintln!("Skipping test: InfluxDB not available");
        return;
    }

    let client = Client::new(INFLUXDB_URL, "not-a-real-token").unwrap();
    let err = match client.query_stream(&cpu_query()).await {
        Ok(_) => panic!("expected rejection"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), ErrorKind::Query);
}
