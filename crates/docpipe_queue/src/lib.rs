//! Durable job queue backed by a relational table (§4.A).

pub mod duckdb_queue;
pub mod error;
pub mod memory_queue;
pub mod queue;

pub use duckdb_queue::DuckDbJobQueue;
pub use error::QueueError;
pub use memory_queue::InMemoryJobQueue;
pub use queue::{CountsByKind, CountsByState, JobQueue};
