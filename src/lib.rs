//! # flux-query-runner
//!
//! Run one Flux query against InfluxDB 2.x and post-process the streamed
//! result on the client side.
//!
//! Results come back as a lazy stream that is decoded one record at a time.
//! [`QueryRunner`] layers a tag filter and a bounded take over the stream and
//! prints the survivors. It closes the client handle however the run ends.
//!
//! ```ignore
//! use flux_query_runner::{Client, Query, QueryRunner, RecordFilter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("http://localhost:9999", "my-token")?;
//!     let query = Query::new(
//!         r#"from(bucket: "my-bucket")
//!             |> range(start: -1d)
//!             |> filter(fn: (r) => (r["_measurement"] == "cpu" and r["_field"] == "usage_system"))"#,
//!         "my-org",
//!     );
//!
//!     QueryRunner::new()
//!         .with_filter(RecordFilter::new("cpu", "cpu0"))
//!         .with_limit(20)
//!         .run(client, &query, &mut std::io::stdout())
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! Output, one line per surviving record:
//!
//! ```text
//! Measurement: cpu, value: 1
//! Measurement: cpu, value: 3
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod flux;
pub mod parser;
pub mod query;
pub mod record;
pub mod runner;
pub mod value;

pub use client::{Client, ClientBuilder};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use flux::{Flux, RangeBound, Restriction};
pub use query::{Query, QuerySource, RecordStream};
pub use record::{Column, DataType, Record, TableMetadata};
pub use runner::{QueryRunner, RecordFilter, RunSummary};
pub use value::Value;

pub use parser::AnnotatedCsvParser;
