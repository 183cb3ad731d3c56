//! Query-and-consume pipeline.
//!
//! A run submits one query to a [`QuerySource`], keeps the records whose tag
//! matches a [`RecordFilter`], stops after `limit` survivors, and writes one
//! line per survivor:
//!
//! ```text
//! Measurement: cpu, value: 1
//! ```
//!
//! The source is closed exactly once when the run ends, whether it finished,
//! hit the limit, or failed.

use std::future::ready;
use std::io::Write;

use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::query::{Query, QuerySource, RecordStream};
use crate::record::Record;
use crate::value::Value;

/// Default number of records printed per run.
pub const DEFAULT_LIMIT: usize = 20;

/// Keeps records whose column `key` is a string equal to `value`.
///
/// Records without the column, or with a non-string cell there, are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordFilter {
    key: String,
    value: String,
}

impl RecordFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn matches(&self, record: &Record) -> bool {
        record
            .value_by_key(&self.key)
            .is_some_and(|v| v.is_string_eq(&self.value))
    }
}

/// Outcome of a successful run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Lines written to the output.
    pub printed: usize,
}

/// Output line for one record.
///
/// Missing measurement or value render as `null`.
pub fn format_record(record: &Record) -> String {
    format!(
        "Measurement: {}, value: {}",
        record.measurement().unwrap_or("null"),
        record.value().unwrap_or(&Value::Null)
    )
}

/// Client-side post-processing of one query's results.
#[derive(Clone, Debug)]
pub struct QueryRunner {
    filter: Option<RecordFilter>,
    limit: Option<usize>,
}

impl Default for QueryRunner {
    fn default() -> Self {
        Self {
            filter: None,
            limit: Some(DEFAULT_LIMIT),
        }
    }
}

impl QueryRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Stop after `limit` records have passed the filter.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Consume the whole stream.
    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn filter(&self) -> Option<&RecordFilter> {
        self.filter.as_ref()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Layer the filter and the bound over `stream`.
    ///
    /// Order is preserved and nothing is buffered. Once the bound is reached
    /// the inner stream is not polled again. Errors pass through the filter
    /// untouched.
    pub fn apply(&self, stream: RecordStream) -> RecordStream {
        let filter = self.filter.clone();
        let filtered = stream.try_filter(move |record| {
            let keep = filter.as_ref().is_none_or(|f| f.matches(record));
            if !keep {
                debug!(table = record.table, "record rejected by filter");
            }
            ready(keep)
        });

        match self.limit {
            Some(limit) => Box::pin(filtered.take(limit)),
            None => Box::pin(filtered),
        }
    }

    /// Run `query` against `source`, writing surviving records to `out`.
    ///
    /// `source` is consumed and closed before this returns, on success and
    /// on every error.
    pub async fn run<S, W>(&self, source: S, query: &Query, out: &mut W) -> Result<RunSummary>
    where
        S: QuerySource,
        W: Write,
    {
        info!(
            org = query.org(),
            filter = ?self.filter,
            limit = ?self.limit,
            "running query"
        );

        let outcome = self.drive(&source, query, out).await;
        source.close();

        match &outcome {
            Ok(summary) => info!(printed = summary.printed, "query run finished"),
            Err(e) => warn!(error = %e, kind = ?e.kind(), "query run failed"),
        }
        outcome
    }

    async fn drive<S, W>(&self, source: &S, query: &Query, out: &mut W) -> Result<RunSummary>
    where
        S: QuerySource,
        W: Write,
    {
        let mut records = self.apply(source.query_stream(query).await?);

        let mut summary = RunSummary::default();
        while let Some(record) = records.try_next().await? {
            writeln!(out, "{}", format_record(&record)).map_err(Error::Output)?;
            summary.printed += 1;
        }
        out.flush().map_err(Error::Output)?;

        Ok(summary)
    }
}
