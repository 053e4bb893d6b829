//! Module boundary over the shared ingestion core.

pub use lakehouse_ingest_core::contract;
pub use lakehouse_ingest_core::retry;
pub use lakehouse_ingest_core::storage_keys;
