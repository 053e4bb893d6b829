use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MAX_WAIT_SECONDS: u64 = 300;

/// Execution status reported by the query service. The set is closed:
/// every execution ends in one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Engine-reported execution statistics. Fields the service omits
/// default to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStatistics {
    pub data_scanned_bytes: i64,
    pub execution_time_ms: i64,
    pub total_time_ms: i64,
}

/// Invocation result returned to the trigger layer by the query runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRunReport {
    pub ok: bool,
    pub query_id: String,
    pub state: QueryState,
    pub statistics: QueryStatistics,
}

/// Conditional-request validators from the last successful feed fetch.
///
/// Callers thread the cursor through each fetch explicitly; the pair is
/// best-effort state that survives warm starts only, and losing it costs
/// a full re-fetch rather than a 304 short-circuit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchCursor {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Flat event record written to the lake, one JSON object per line.
///
/// `payload_raw` is a reserved column kept present (as `null`) so the
/// downstream table schema stays stable until payloads are ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub id: Value,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created_at: String,
    pub repo_id: Option<Value>,
    pub repo_name: String,
    pub actor_id: Option<Value>,
    pub actor_login: String,
    pub payload_raw: Option<Value>,
}

/// Invocation result returned to the trigger layer by the feed ingester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub ok: bool,
    pub sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
}

/// Map a raw feed event to its normalized form.
///
/// Required fields: `id`, `type`, `created_at`, `repo.name`,
/// `actor.login`. A record missing any of them is dropped, not an
/// error. Optional numeric ids pass through untouched.
pub fn normalize_event(event: &Value) -> Option<NormalizedEvent> {
    let object = event.as_object()?;
    let repo = object.get("repo").and_then(Value::as_object);
    let actor = object.get("actor").and_then(Value::as_object);

    let id = object.get("id").filter(|value| is_present(value))?.clone();
    let event_type = required_str(object.get("type"))?;
    let created_at = required_str(object.get("created_at"))?;
    let repo_name = required_str(repo.and_then(|repo| repo.get("name")))?;
    let actor_login = required_str(actor.and_then(|actor| actor.get("login")))?;

    Some(NormalizedEvent {
        id,
        event_type: event_type.to_string(),
        created_at: created_at.to_string(),
        repo_id: optional_field(repo, "id"),
        repo_name: repo_name.to_string(),
        actor_id: optional_field(actor, "id"),
        actor_login: actor_login.to_string(),
        payload_raw: None,
    })
}

/// Serialize one raw feed event as a JSONL line, or nothing if the
/// record fails the presence checks.
pub fn to_jsonl_line(event: &Value) -> Option<String> {
    normalize_event(event).map(|record| {
        serde_json::to_string(&record).expect("serialization of contract value should not fail")
    })
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

fn required_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|text| !text.is_empty())
}

fn optional_field(object: Option<&serde_json::Map<String, Value>>, key: &str) -> Option<Value> {
    object
        .and_then(|object| object.get(key))
        .filter(|value| !value.is_null())
        .cloned()
}
