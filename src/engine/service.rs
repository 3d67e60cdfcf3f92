use std::sync::Arc;
use crate::{Record, RecordReader, RecordStore, RecordWriter, Result};
use crate::engine::RateLimiter;

/// Rate-limited front door to a [`RecordStore`].
///
/// Each call consumes a point for the caller before the store sees the
/// request, so a denied caller costs no I/O and no validation.
pub struct RecordService {
    limiter: RateLimiter,
    store: Arc<dyn RecordStore>,
}

impl RecordService {
    pub fn new(store: Arc<dyn RecordStore>, limiter: RateLimiter) -> Self {
        Self { limiter, store }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Consumes a point for `client_id` and hands back the store.
    ///
    /// Adapters call this before decoding request arguments, so malformed
    /// requests are throttled like any other.
    pub fn admit(&self, client_id: &str) -> Result<&dyn RecordStore> {
        self.limiter.consume(client_id)?;
        Ok(self.store.as_ref())
    }

    pub async fn read(&self, client_id: &str) -> Result<Vec<Record>> {
        self.admit(client_id)?.read().await
    }

    pub async fn get(&self, client_id: &str, id: i64) -> Result<Record> {
        self.admit(client_id)?.get(id).await
    }

    pub async fn create(&self, client_id: &str, record: Record) -> Result<Record> {
        self.admit(client_id)?.create(record).await
    }

    pub async fn update(&self, client_id: &str, id: i64, partial: Record) -> Result<Record> {
        self.admit(client_id)?.update(id, partial).await
    }

    pub async fn delete(&self, client_id: &str, id: i64) -> Result<i64> {
        self.admit(client_id)?.delete(id).await
    }
}
