//! Queries and the sources that execute them.

use std::future::Future;
use std::pin::Pin;

use futures::Stream;

use crate::error::Result;
use crate::record::Record;

/// Lazy, finite, single-pass sequence of records.
///
/// The stream ends after its first error.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record>> + Send>>;

/// A Flux query scoped to an organization.
///
/// The text is handed to the server untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    text: String,
    org: String,
}

impl Query {
    pub fn new(text: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            org: org.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn org(&self) -> &str {
        &self.org
    }
}

/// Something that can execute a [`Query`] and stream back its records.
///
/// [`Client`](crate::Client) is the HTTP implementation. A source is an owned
/// handle: [`close`](QuerySource::close) consumes it.
pub trait QuerySource {
    /// Submit `query` and return its result stream.
    ///
    /// Errors here mean the query never started streaming.
    fn query_stream(&self, query: &Query) -> impl Future<Output = Result<RecordStream>> + Send;

    /// Release the handle and everything it holds.
    fn close(self)
    where
        Self: Sized;
}
