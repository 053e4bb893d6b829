//! AWS-oriented adapters and handlers for the scheduled ingestion jobs.
//!
//! This crate owns runtime integration details (Lambda entry points, the
//! query engine and object store adapters, and the feed HTTP transport)
//! and exposes a single runtime module boundary for contract, retry, and
//! storage key primitives.
//! See `crates/lakehouse_ingest_lambda/README.md` for ownership boundaries.

pub mod adapters;
pub mod handlers;
pub mod runtime;
