use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};

use crate::adapters::clock::Clock;
use crate::adapters::event_feed::EventFeed;
use crate::adapters::object_store::ObjectStore;
use crate::runtime::contract::{to_jsonl_line, FetchCursor, IngestReport};
use crate::runtime::retry::{AttemptOutcome, RetryPolicy};
use crate::runtime::storage_keys::{content_digest, events_object_key};

pub const FEED_RETRY_ATTEMPTS: u32 = 4;
pub const FEED_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

const RETRYABLE_STATUSES: [u16; 6] = [403, 429, 500, 502, 503, 504];
const CONTENT_TYPE: &str = "application/json";
const CONTENT_ENCODING: &str = "gzip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestHandlerConfig {
    pub bucket: String,
    pub prefix: String,
    pub ingest_date: String,
    pub ingest_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedIngestError {
    Http { status: u16 },
    Transport { message: String },
    Compression { message: String },
    Storage { message: String },
}

impl std::fmt::Display for FeedIngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http { status } => write!(f, "feed request failed with status {status}"),
            Self::Transport { message } => write!(f, "feed transport error: {message}"),
            Self::Compression { message } => write!(f, "failed to compress batch: {message}"),
            Self::Storage { message } => write!(f, "failed to persist batch: {message}"),
        }
    }
}

impl std::error::Error for FeedIngestError {}

/// Fetch the feed with conditional headers and a bounded retry budget.
///
/// A 304 yields an empty batch and leaves the cursor unchanged. On
/// success the cursor picks up the response validators, keeping the
/// previous value when a header is absent. A body that is not a JSON
/// array yields an empty batch rather than an error.
pub fn fetch_events(
    feed: &impl EventFeed,
    cursor: &FetchCursor,
    policy: &RetryPolicy,
    clock: &impl Clock,
) -> Result<(Vec<Value>, FetchCursor), FeedIngestError> {
    let response = policy.run(
        |attempt| match feed.get_events(cursor) {
            Ok(response) if RETRYABLE_STATUSES.contains(&response.status) => {
                // Retry-After overrides the backoff for rate limiting only.
                let explicit_wait = match response.status {
                    403 | 429 => response.retry_after_seconds.map(Duration::from_secs),
                    _ => None,
                };
                log_ingest_info(
                    "feed_retry",
                    json!({
                        "attempt": attempt,
                        "status": response.status,
                    }),
                );
                AttemptOutcome::Retryable {
                    error: FeedIngestError::Http {
                        status: response.status,
                    },
                    explicit_wait,
                }
            }
            Ok(response) if response.status == 304 || (200..300).contains(&response.status) => {
                AttemptOutcome::Success(response)
            }
            Ok(response) => AttemptOutcome::Fatal(FeedIngestError::Http {
                status: response.status,
            }),
            Err(message) => {
                log_ingest_info(
                    "feed_retry",
                    json!({
                        "attempt": attempt,
                        "error": message,
                    }),
                );
                AttemptOutcome::Retryable {
                    error: FeedIngestError::Transport { message },
                    explicit_wait: None,
                }
            }
        },
        |wait| clock.sleep(wait),
    )?;

    if response.status == 304 {
        log_ingest_info("feed_not_modified", json!({}));
        return Ok((Vec::new(), cursor.clone()));
    }

    let next_cursor = FetchCursor {
        etag: response.etag.clone().or_else(|| cursor.etag.clone()),
        last_modified: response
            .last_modified
            .clone()
            .or_else(|| cursor.last_modified.clone()),
    };

    let events = match serde_json::from_slice::<Value>(&response.body) {
        Ok(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    log_ingest_info("feed_fetched", json!({"events": events.len()}));

    Ok((events, next_cursor))
}

/// Fetch, normalize, compress, and write one batch of feed events.
///
/// Records failing the presence checks are dropped silently. An empty
/// batch reports success with a zero count and writes nothing. After the
/// fetch there are no retries: any error aborts the invocation.
pub fn handle_ingest(
    config: &IngestHandlerConfig,
    feed: &impl EventFeed,
    store: &impl ObjectStore,
    clock: &impl Clock,
    invocation_id: &str,
    cursor: &FetchCursor,
) -> Result<(IngestReport, FetchCursor), FeedIngestError> {
    let policy = RetryPolicy::new(FEED_RETRY_ATTEMPTS, FEED_INITIAL_BACKOFF);
    let (events, next_cursor) = fetch_events(feed, cursor, &policy, clock)?;

    let lines: Vec<String> = events.iter().filter_map(to_jsonl_line).collect();

    if lines.is_empty() {
        log_ingest_info("ingest_empty", json!({"fetched": events.len()}));
        return Ok((
            IngestReport {
                ok: true,
                sent: 0,
                s3_key: None,
            },
            next_cursor,
        ));
    }

    let mut content = lines.join("\n");
    content.push('\n');

    let digest = content_digest(content.as_bytes());
    let key = events_object_key(
        &config.prefix,
        &config.ingest_date,
        &config.ingest_time,
        invocation_id,
        &digest,
    );

    let compressed = gzip_compress(content.as_bytes())?;
    if let Err(message) = store.put_object(&key, &compressed, CONTENT_TYPE, CONTENT_ENCODING) {
        log_ingest_error(
            "ingest_write_failed",
            json!({
                "bucket": config.bucket,
                "key": key,
                "error": message,
            }),
        );
        return Err(FeedIngestError::Storage { message });
    }

    log_ingest_info(
        "ingest_uploaded",
        json!({
            "sent": lines.len(),
            "bucket": config.bucket,
            "key": key,
        }),
    );

    Ok((
        IngestReport {
            ok: true,
            sent: lines.len(),
            s3_key: Some(key),
        },
        next_cursor,
    ))
}

fn gzip_compress(content: &[u8]) -> Result<Vec<u8>, FeedIngestError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(content)
        .map_err(|error| FeedIngestError::Compression {
            message: error.to_string(),
        })?;
    encoder.finish().map_err(|error| FeedIngestError::Compression {
        message: error.to_string(),
    })
}

fn info_logging_enabled() -> bool {
    match std::env::var("LOG_LEVEL") {
        Ok(level) => {
            let level = level.to_ascii_uppercase();
            level == "INFO" || level == "DEBUG"
        }
        Err(_) => true,
    }
}

fn log_ingest_info(event: &str, details: Value) {
    if !info_logging_enabled() {
        return;
    }
    eprintln!(
        "{}",
        json!({
            "component": "feed_ingester",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_ingest_error(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "feed_ingester",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
