use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use flux_query_runner::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flux-query-runner")]
#[command(version, about = "Run a Flux query and print the matching records", long_about = None)]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// InfluxDB server URL
    #[arg(long, env = "INFLUXDB_URL")]
    url: Option<String>,

    /// Authentication token
    #[arg(long, env = "INFLUXDB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Organization the query runs in
    #[arg(long, env = "INFLUXDB_ORG")]
    org: Option<String>,

    /// Raw Flux query; replaces --bucket/--range-start/--measurement/--field
    #[arg(short, long)]
    query: Option<String>,

    /// Bucket to read from
    #[arg(short, long)]
    bucket: Option<String>,

    /// Range start, relative (-1d, -30m) or RFC3339
    #[arg(long)]
    range_start: Option<String>,

    /// Server-side _measurement restriction
    #[arg(long)]
    measurement: Option<String>,

    /// Server-side _field restriction
    #[arg(long)]
    field: Option<String>,

    /// Column checked by the client-side filter
    #[arg(long, requires = "filter_value")]
    filter_key: Option<String>,

    /// Value the filter column must equal
    #[arg(long, requires = "filter_key")]
    filter_value: Option<String>,

    /// Print at most this many records
    #[arg(short, long, conflicts_with = "unbounded")]
    limit: Option<usize>,

    /// Print every matching record
    #[arg(long)]
    unbounded: bool,

    /// Request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(token) = self.token {
            config.token = token;
        }
        if let Some(org) = self.org {
            config.org = org;
        }
        if self.query.is_some() {
            config.query = self.query;
        }
        if let Some(bucket) = self.bucket {
            config.bucket = bucket;
        }
        if let Some(start) = self.range_start {
            config.range_start = start;
        }
        if self.measurement.is_some() {
            config.measurement = self.measurement;
        }
        if self.field.is_some() {
            config.field = self.field;
        }
        if self.filter_key.is_some() {
            config.filter_key = self.filter_key;
            config.filter_value = self.filter_value;
        }
        if self.unbounded {
            config.limit = None;
        } else if self.limit.is_some() {
            config.limit = self.limit;
        }
        if self.timeout_secs.is_some() {
            config.timeout_secs = self.timeout_secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    cli.apply(&mut config);

    let runner = config.runner()?;
    let query = config.query()?;
    let client = config.client().context("creating InfluxDB client")?;

    runner.run(client, &query, &mut std::io::stdout()).await?;

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "flux_query_runner=debug"
    } else {
        "flux_query_runner=info"
    };

    // stdout carries records only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
