use lakehouse_ingest_core::contract::FetchCursor;
use serde::{Deserialize, Serialize};

/// One HTTP exchange with the event feed. Non-2xx statuses are returned
/// as responses, not errors; `Err` is reserved for transport failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedHttpResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub retry_after_seconds: Option<u64>,
    pub body: Vec<u8>,
}

pub trait EventFeed {
    /// Issue a single conditional GET against the feed, sending
    /// `If-None-Match`/`If-Modified-Since` from the cursor when present.
    fn get_events(&self, cursor: &FetchCursor) -> Result<FeedHttpResponse, String>;
}
