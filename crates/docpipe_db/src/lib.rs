//! Storage adapter: a typed facade over the relational store backing the
//! document pipeline (§4.D).
//!
//! DuckDB is columnar, OLAP-optimized, and enforces a single-writer model,
//! which matches this pipeline's access pattern: many concurrent readers
//! across handlers, but each document's row is only ever touched by the
//! handler currently owning that document's stage.

pub mod adapter;
pub mod duckdb_adapter;
pub mod error;
pub mod memory;

pub use adapter::{Deal, StorageAdapter};
pub use duckdb_adapter::DuckDbStorageAdapter;
pub use error::StorageError;
pub use memory::InMemoryStorageAdapter;
