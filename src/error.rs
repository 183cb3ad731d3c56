//! Error types for flux-query-runner.

use thiserror::Error;

/// Broad classification of an [`Error`], matching the stage of a run that
/// failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The client handle could not be constructed.
    Connection,
    /// The server rejected the query, or it could not be submitted.
    Query,
    /// The result stream failed after it started.
    Stream,
    /// Runner configuration is invalid.
    Config,
}

/// Error type for flux-query-runner operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The client handle could not be created.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected the query.
    #[error("Query error from InfluxDB: {message}")]
    Query {
        /// HTTP status, when the rejection came back as a non-2xx response.
        status: Option<u16>,
        /// Error message returned by InfluxDB.
        message: String,
        /// Optional reference link for debugging.
        reference: Option<String>,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to serialize query to JSON.
    #[error("Failed to serialize query: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to parse CSV data.
    #[error("CSV parse error: {0}")]
    Csv(String),

    /// Failed to parse a value from the response.
    #[error("Failed to parse value: {message}")]
    Parse {
        /// Description of what failed to parse.
        message: String,
    },

    /// Unknown data type in annotated CSV.
    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// Missing required annotation in CSV.
    #[error("Missing annotation: {0}")]
    MissingAnnotation(String),

    /// Row has different number of columns than expected.
    #[error("Column count mismatch: expected {expected}, got {actual}")]
    ColumnMismatch {
        /// Expected number of columns.
        expected: usize,
        /// Actual number of columns found.
        actual: usize,
    },

    /// I/O error while reading the response body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing a record to the output sink failed.
    #[error("Failed to write output: {0}")]
    Output(#[source] std::io::Error),

    /// Invalid runner configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Classify this error by the stage of the run it belongs to.
    ///
    /// HTTP failures are counted as query errors: the client only surfaces
    /// them from submission. Body read failures arrive as [`Error::Io`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::Connection,
            Error::Query { .. } | Error::Http(_) | Error::Serialization(_) => ErrorKind::Query,
            Error::Csv(_)
            | Error::Parse { .. }
            | Error::UnknownDataType(_)
            | Error::MissingAnnotation(_)
            | Error::ColumnMismatch { .. }
            | Error::Io(_)
            | Error::Output(_) => ErrorKind::Stream,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

/// Result type alias for flux-query-runner operations.
pub type Result<T> = std::result::Result<T, Error>;
