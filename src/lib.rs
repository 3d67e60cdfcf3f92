//! Recstore is a small file-backed record store.
//!
//! Records are JSON objects identified by a caller-supplied integer `id`. Every
//! write is checked against a declarative [`Schema`](engine::Schema) and the whole
//! collection is persisted as a single pretty-printed JSON array. Access is
//! throttled per client by a fixed-window [`RateLimiter`](engine::RateLimiter).
//!
//! ## Core Components
//! - [`engine`]: Validation, document persistence, rate limiting and the service that composes them.
//! - [`sdk`]: Remote TCP client and embedded/remote discovery.
//! - [`server`]: TCP daemon translating protocol lines into engine calls.

pub mod engine;
pub mod sdk;
pub mod server;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use engine::persistence::StorageError;
pub use engine::schema::ValidationError;

/// A single stored item. Must carry an integer `id` field.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Errors returned by the record store.
#[derive(Error, Debug)]
pub enum Error {
    /// The candidate record does not satisfy the schema.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// No record with the given id exists.
    #[error("record {0} not found")]
    NotFound(i64),
    /// The backing document could not be read, parsed or written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// The caller has used up its quota for the current window.
    #[error("rate limit exceeded, retry in {}ms", .retry_after.as_millis())]
    Denied { retry_after: Duration },
    /// A protocol line could not be understood.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// An error reported by a remote daemon.
    #[error("{kind} ({status}): {message}")]
    Remote { status: u16, kind: String, message: String },
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
    /// An I/O error occurred during network communication.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// The HTTP-equivalent status code the adapters report for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::NotFound(_) | Error::BadRequest(_) | Error::Serialization(_) => 400,
            Error::Denied { .. } => 429,
            Error::Remote { status, .. } => *status,
            Error::Storage(_) | Error::Internal(_) | Error::Io(_) => 500,
        }
    }

    /// Short machine-readable tag for this error.
    pub fn kind(&self) -> &str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::BadRequest(_) | Error::Serialization(_) => "bad_request",
            Error::Denied { .. } => "denied",
            Error::Storage(_) => "storage",
            Error::Remote { kind, .. } => kind,
            Error::Internal(_) | Error::Io(_) => "internal",
        }
    }
}

/// A specialized Result type for record store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the integer id of a record, if it has one.
pub fn record_id(record: &Record) -> Option<i64> {
    record.get("id").and_then(serde_json::Value::as_i64)
}

/// Read access to the stored document.
#[async_trait]
pub trait RecordReader: Send + Sync {
    /// Returns every record in insertion order.
    async fn read(&self) -> Result<Vec<Record>>;
    /// Returns the record with the given id.
    async fn get(&self, id: i64) -> Result<Record>;
}

/// Mutations of the stored document. Each call rewrites the whole document.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Validates and appends a record, returning it unchanged.
    async fn create(&self, record: Record) -> Result<Record>;
    /// Merges `partial` over the record with `id`, validates the result and stores it in place.
    async fn update(&self, id: i64, partial: Record) -> Result<Record>;
    /// Removes every record with `id` and returns the id.
    async fn delete(&self, id: i64) -> Result<i64>;
}

/// The full record store interface, implemented by the embedded
/// [`DocumentStore`](engine::DocumentStore) and the remote [`Client`](sdk::Client).
pub trait RecordStore: RecordReader + RecordWriter {}

impl<T: RecordReader + RecordWriter> RecordStore for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id() {
        let rec = json!({"id": 7, "name": "x"}).as_object().cloned().unwrap();
        assert_eq!(record_id(&rec), Some(7));

        let rec = json!({"id": "7"}).as_object().cloned().unwrap();
        assert_eq!(record_id(&rec), None);

        let rec = json!({"id": 1.5}).as_object().cloned().unwrap();
        assert_eq!(record_id(&rec), None);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NotFound(1).status_code(), 400);
        assert_eq!(Error::Denied { retry_after: Duration::from_millis(5) }.status_code(), 429);
        assert_eq!(Error::Internal("x".into()).status_code(), 500);
        assert_eq!(Error::NotFound(1).kind(), "not_found");
    }
}
