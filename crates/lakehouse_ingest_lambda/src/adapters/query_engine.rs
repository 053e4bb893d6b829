use lakehouse_ingest_core::contract::{QueryState, QueryStatistics};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a query execution as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryStatusSnapshot {
    pub state: QueryState,
    pub reason: Option<String>,
    pub statistics: Option<QueryStatistics>,
}

pub trait QueryEngine {
    fn submit(
        &self,
        sql: &str,
        database: &str,
        workgroup: &str,
        output_location: Option<&str>,
    ) -> Result<String, String>;

    fn describe(&self, query_id: &str) -> Result<QueryStatusSnapshot, String>;

    fn cancel(&self, query_id: &str) -> Result<(), String>;
}
