pub mod docstore;
pub mod limiter;
pub mod persistence;
pub mod schema;
pub mod service;

pub use docstore::DocumentStore;
pub use limiter::{LimiterConfig, RateLimitState, RateLimiter};
pub use persistence::{Backend, Persistence};
pub use schema::{FieldKind, FieldRule, Schema};
pub use service::RecordService;
