/// TCP server implementation for the record store daemon.
///
/// This module provides the [`Router`] which handles incoming TCP connections
/// and dispatches protocol lines to a [`RecordService`](crate::engine::RecordService).
pub mod router;

pub use router::Router;
