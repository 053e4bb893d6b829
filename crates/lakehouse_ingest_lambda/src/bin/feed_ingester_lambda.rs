use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use lakehouse_ingest_lambda::adapters::clock::SystemClock;
use lakehouse_ingest_lambda::adapters::event_feed::{EventFeed, FeedHttpResponse};
use lakehouse_ingest_lambda::adapters::object_store::ObjectStore;
use lakehouse_ingest_lambda::handlers::feed_ingester::{handle_ingest, IngestHandlerConfig};
use lakehouse_ingest_lambda::runtime::contract::{FetchCursor, IngestReport};

const DEFAULT_FEED_URL: &str = "https://api.github.com/events";
const DEFAULT_KEY_PREFIX: &str = "github/events";
const FEED_USER_AGENT: &str = "aws-lakehouse-ingestor";
const FEED_ACCEPT: &str = "application/vnd.github+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// Survives warm starts of the execution environment only; a cold start
// falls back to an unconditional fetch.
static WARM_CURSOR: OnceLock<Mutex<FetchCursor>> = OnceLock::new();

fn warm_cursor() -> &'static Mutex<FetchCursor> {
    WARM_CURSOR.get_or_init(|| Mutex::new(FetchCursor::default()))
}

struct GithubEventFeed {
    http_client: reqwest::blocking::Client,
    endpoint: String,
    token: Option<String>,
}

impl GithubEventFeed {
    fn new(endpoint: &str, token: Option<String>) -> Result<Self, String> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| format!("failed to build feed http client: {error}"))?;
        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }
}

impl EventFeed for GithubEventFeed {
    fn get_events(&self, cursor: &FetchCursor) -> Result<FeedHttpResponse, String> {
        let mut request = self
            .http_client
            .get(&self.endpoint)
            .header(reqwest::header::USER_AGENT, FEED_USER_AGENT)
            .header(reqwest::header::ACCEPT, FEED_ACCEPT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(etag) = &cursor.etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &cursor.last_modified {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request
            .send()
            .map_err(|error| format!("feed request failed: {error}"))?;

        let status = response.status().as_u16();
        let etag = header_value(&response, reqwest::header::ETAG);
        let last_modified = header_value(&response, reqwest::header::LAST_MODIFIED);
        let retry_after_seconds = header_value(&response, reqwest::header::RETRY_AFTER)
            .and_then(|value| value.trim().parse::<u64>().ok());

        let body = response
            .bytes()
            .map_err(|error| format!("failed to read feed body: {error}"))?
            .to_vec();

        Ok(FeedHttpResponse {
            status,
            etag,
            last_modified,
            retry_after_seconds,
            body,
        })
    }
}

fn header_value(
    response: &reqwest::blocking::Response,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

struct S3EventStore {
    bucket: String,
    s3_client: aws_sdk_s3::Client,
}

impl ObjectStore for S3EventStore {
    fn put_object(
        &self,
        key: &str,
        body: &[u8],
        content_type: &str,
        content_encoding: &str,
    ) -> Result<(), String> {
        let bucket = self.bucket.clone();
        let object_key = key.to_string();
        let body_bytes = body.to_vec();
        let content_type = content_type.to_string();
        let content_encoding = content_encoding.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(object_key)
                    .body(ByteStream::from(body_bytes))
                    .content_type(content_type)
                    .content_encoding(content_encoding)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to write object to s3: {error}"))
            })
        })
    }
}

async fn handle_request(event: LambdaEvent<serde_json::Value>) -> Result<IngestReport, Error> {
    let bucket =
        std::env::var("S3_BUCKET").map_err(|_| Error::from("S3_BUCKET must be configured"))?;
    let prefix = std::env::var("S3_PREFIX").unwrap_or_else(|_| DEFAULT_KEY_PREFIX.to_string());
    let feed_url = std::env::var("FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());
    let token = std::env::var("GH_TOKEN").ok().filter(|value| !value.is_empty());

    let now = Utc::now();
    let config = IngestHandlerConfig {
        bucket: bucket.clone(),
        prefix,
        ingest_date: now.format("%Y-%m-%d").to_string(),
        ingest_time: now.format("%Y%m%d-%H%M%S").to_string(),
    };

    let invocation_id = event.context.request_id.clone();

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let store = S3EventStore {
        bucket,
        s3_client: aws_sdk_s3::Client::new(&aws_config),
    };
    let clock = SystemClock::new();

    let cursor = warm_cursor()
        .lock()
        .map_err(|_| Error::from("warm cursor mutex poisoned"))?
        .clone();

    let (report, next_cursor) = tokio::task::block_in_place(|| {
        let feed = GithubEventFeed::new(&feed_url, token)?;
        handle_ingest(&config, &feed, &store, &clock, &invocation_id, &cursor)
            .map_err(|error| error.to_string())
    })
    .map_err(Error::from)?;

    if let Ok(mut guard) = warm_cursor().lock() {
        *guard = next_cursor;
    }

    Ok(report)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
