use std::time::Duration;

use serde_json::json;

use crate::adapters::clock::Clock;
use crate::adapters::query_engine::QueryEngine;
use crate::runtime::contract::{QueryRunReport, QueryState};

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

const SQL_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRunnerConfig {
    pub database: String,
    pub workgroup: String,
    pub sql: String,
    pub output_location: Option<String>,
    pub max_wait: Duration,
}

/// Terminal polling result. Failed and cancelled executions are returned
/// normally here; converting them into a hard failure is the caller's
/// decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    pub query_id: String,
    pub state: QueryState,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRunnerError {
    Engine {
        message: String,
    },
    Timeout {
        query_id: String,
        waited: Duration,
    },
    TerminalFailure {
        query_id: String,
        state: QueryState,
        reason: String,
    },
}

impl std::fmt::Display for QueryRunnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine { message } => write!(f, "query engine error: {message}"),
            Self::Timeout { query_id, waited } => {
                write!(f, "query timeout after {}s: {query_id}", waited.as_secs())
            }
            Self::TerminalFailure {
                query_id,
                state,
                reason,
            } => {
                write!(
                    f,
                    "query {query_id} finished with state {}: {reason}",
                    state.as_str()
                )
            }
        }
    }
}

impl std::error::Error for QueryRunnerError {}

/// Submit the configured query and poll until a terminal state.
///
/// Polls on a fixed interval; once elapsed wall-clock exceeds
/// `max_wait`, the remote execution is cancelled and the invocation
/// fails with `Timeout`. Engine transport errors propagate immediately
/// without retry.
pub fn start_and_wait(
    config: &QueryRunnerConfig,
    engine: &impl QueryEngine,
    clock: &impl Clock,
) -> Result<QueryOutcome, QueryRunnerError> {
    let query_id = engine
        .submit(
            &config.sql,
            &config.database,
            &config.workgroup,
            config.output_location.as_deref(),
        )
        .map_err(|message| QueryRunnerError::Engine { message })?;

    log_query_info(
        "query_started",
        json!({
            "query_id": query_id,
            "database": config.database,
            "workgroup": config.workgroup,
            "sql_preview": config.sql.chars().take(SQL_PREVIEW_CHARS).collect::<String>(),
        }),
    );

    let started = clock.elapsed();
    loop {
        let waited = clock.elapsed() - started;
        if waited > config.max_wait {
            if let Err(message) = engine.cancel(&query_id) {
                log_query_error(
                    "query_cancel_failed",
                    json!({
                        "query_id": query_id,
                        "error": message,
                    }),
                );
            }
            log_query_error(
                "query_timeout",
                json!({
                    "query_id": query_id,
                    "waited_seconds": waited.as_secs(),
                    "max_wait_seconds": config.max_wait.as_secs(),
                }),
            );
            return Err(QueryRunnerError::Timeout { query_id, waited });
        }

        let snapshot = engine
            .describe(&query_id)
            .map_err(|message| QueryRunnerError::Engine { message })?;

        log_query_info(
            "query_state",
            json!({
                "query_id": query_id,
                "state": snapshot.state.as_str(),
            }),
        );

        if snapshot.state.is_terminal() {
            match snapshot.state {
                QueryState::Failed => log_query_error(
                    "query_failed",
                    json!({
                        "query_id": query_id,
                        "reason": snapshot
                            .reason
                            .as_deref()
                            .unwrap_or("Unknown error"),
                    }),
                ),
                QueryState::Cancelled => {
                    log_query_error("query_cancelled", json!({"query_id": query_id}))
                }
                _ => {}
            }
            return Ok(QueryOutcome {
                query_id,
                state: snapshot.state,
                reason: snapshot.reason,
            });
        }

        clock.sleep(POLL_INTERVAL);
    }
}

/// Run the configured query end to end and build the invocation report.
///
/// Statistics are retrieved for every terminal state; a non-succeeded
/// state then becomes a hard `TerminalFailure` so the trigger layer sees
/// the invocation fail.
pub fn handle_query_event(
    config: &QueryRunnerConfig,
    engine: &impl QueryEngine,
    clock: &impl Clock,
) -> Result<QueryRunReport, QueryRunnerError> {
    let outcome = start_and_wait(config, engine, clock)?;

    let snapshot = engine
        .describe(&outcome.query_id)
        .map_err(|message| QueryRunnerError::Engine { message })?;
    let statistics = snapshot.statistics.unwrap_or_default();

    let report = QueryRunReport {
        ok: outcome.state == QueryState::Succeeded,
        query_id: outcome.query_id,
        state: outcome.state,
        statistics,
    };

    log_query_info(
        "query_finished",
        json!({
            "query_id": report.query_id,
            "state": report.state.as_str(),
            "statistics": statistics,
        }),
    );

    if !report.ok {
        return Err(QueryRunnerError::TerminalFailure {
            query_id: report.query_id,
            state: report.state,
            reason: outcome
                .reason
                .unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    Ok(report)
}

fn log_query_info(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "query_runner",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_query_error(event: &str, details: serde_json::Value) {
    eprintln!(
        "{}",
        json!({
            "component": "query_runner",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::adapters::query_engine::QueryStatusSnapshot;
    use crate::runtime::contract::QueryStatistics;

    use super::*;

    struct ScriptedEngine {
        submit_result: Result<String, String>,
        describes: Mutex<VecDeque<Result<QueryStatusSnapshot, String>>>,
        cancels: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        fn new(describes: Vec<Result<QueryStatusSnapshot, String>>) -> Self {
            Self {
                submit_result: Ok("query-123".to_string()),
                describes: Mutex::new(describes.into()),
                cancels: Mutex::new(Vec::new()),
            }
        }

        fn cancelled(&self) -> Vec<String> {
            self.cancels.lock().expect("poisoned mutex").clone()
        }
    }

    impl QueryEngine for ScriptedEngine {
        fn submit(
            &self,
            _sql: &str,
            _database: &str,
            _workgroup: &str,
            _output_location: Option<&str>,
        ) -> Result<String, String> {
            self.submit_result.clone()
        }

        fn describe(&self, _query_id: &str) -> Result<QueryStatusSnapshot, String> {
            self.describes
                .lock()
                .expect("poisoned mutex")
                .pop_front()
                .unwrap_or_else(|| Ok(running()))
        }

        fn cancel(&self, query_id: &str) -> Result<(), String> {
            self.cancels
                .lock()
                .expect("poisoned mutex")
                .push(query_id.to_string());
            Ok(())
        }
    }

    struct FakeClock {
        now: Mutex<Duration>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        fn recorded_sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().expect("poisoned mutex").clone()
        }
    }

    impl Clock for FakeClock {
        fn elapsed(&self) -> Duration {
            *self.now.lock().expect("poisoned mutex")
        }

        fn sleep(&self, wait: Duration) {
            *self.now.lock().expect("poisoned mutex") += wait;
            self.sleeps.lock().expect("poisoned mutex").push(wait);
        }
    }

    fn running() -> QueryStatusSnapshot {
        QueryStatusSnapshot {
            state: QueryState::Running,
            reason: None,
            statistics: None,
        }
    }

    fn terminal(state: QueryState, reason: Option<&str>) -> QueryStatusSnapshot {
        QueryStatusSnapshot {
            state,
            reason: reason.map(str::to_string),
            statistics: Some(sample_statistics()),
        }
    }

    fn sample_statistics() -> QueryStatistics {
        QueryStatistics {
            data_scanned_bytes: 1_048_576,
            execution_time_ms: 2_500,
            total_time_ms: 2_750,
        }
    }

    fn config() -> QueryRunnerConfig {
        QueryRunnerConfig {
            database: "silver".to_string(),
            workgroup: "primary".to_string(),
            sql: "SELECT 1".to_string(),
            output_location: None,
            max_wait: Duration::from_secs(300),
        }
    }

    #[test]
    fn succeeded_query_reports_statistics() {
        let engine = ScriptedEngine::new(vec![
            Ok(running()),
            Ok(running()),
            Ok(terminal(QueryState::Succeeded, None)),
            Ok(terminal(QueryState::Succeeded, None)),
        ]);
        let clock = FakeClock::new();

        let report =
            handle_query_event(&config(), &engine, &clock).expect("query should succeed");

        assert!(report.ok);
        assert_eq!(report.query_id, "query-123");
        assert_eq!(report.state, QueryState::Succeeded);
        assert_eq!(report.statistics, sample_statistics());
        assert!(engine.cancelled().is_empty());
    }

    #[test]
    fn polls_on_fixed_interval_until_terminal() {
        let engine = ScriptedEngine::new(vec![
            Ok(running()),
            Ok(running()),
            Ok(running()),
            Ok(terminal(QueryState::Succeeded, None)),
            Ok(terminal(QueryState::Succeeded, None)),
        ]);
        let clock = FakeClock::new();

        handle_query_event(&config(), &engine, &clock).expect("query should succeed");

        assert_eq!(
            clock.recorded_sleeps(),
            vec![POLL_INTERVAL, POLL_INTERVAL, POLL_INTERVAL]
        );
    }

    #[test]
    fn missing_statistics_default_to_zero() {
        let terminal_without_stats = QueryStatusSnapshot {
            state: QueryState::Succeeded,
            reason: None,
            statistics: None,
        };
        let engine = ScriptedEngine::new(vec![
            Ok(terminal_without_stats.clone()),
            Ok(terminal_without_stats),
        ]);
        let clock = FakeClock::new();

        let report =
            handle_query_event(&config(), &engine, &clock).expect("query should succeed");

        assert_eq!(report.statistics, QueryStatistics::default());
    }

    #[test]
    fn failed_query_surfaces_reason_as_hard_failure() {
        let engine = ScriptedEngine::new(vec![
            Ok(terminal(QueryState::Failed, Some("SYNTAX_ERROR at line 3"))),
            Ok(terminal(QueryState::Failed, Some("SYNTAX_ERROR at line 3"))),
        ]);
        let clock = FakeClock::new();

        let error =
            handle_query_event(&config(), &engine, &clock).expect_err("query should fail");

        assert_eq!(
            error,
            QueryRunnerError::TerminalFailure {
                query_id: "query-123".to_string(),
                state: QueryState::Failed,
                reason: "SYNTAX_ERROR at line 3".to_string(),
            }
        );
    }

    #[test]
    fn missing_failure_reason_falls_back_to_unknown_error() {
        let engine = ScriptedEngine::new(vec![
            Ok(terminal(QueryState::Failed, None)),
            Ok(terminal(QueryState::Failed, None)),
        ]);
        let clock = FakeClock::new();

        let error =
            handle_query_event(&config(), &engine, &clock).expect_err("query should fail");

        match error {
            QueryRunnerError::TerminalFailure { reason, .. } => {
                assert_eq!(reason, "Unknown error");
            }
            other => panic!("expected terminal failure, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_query_is_a_hard_failure() {
        let engine = ScriptedEngine::new(vec![
            Ok(terminal(QueryState::Cancelled, None)),
            Ok(terminal(QueryState::Cancelled, None)),
        ]);
        let clock = FakeClock::new();

        let error =
            handle_query_event(&config(), &engine, &clock).expect_err("query should fail");

        assert!(matches!(
            error,
            QueryRunnerError::TerminalFailure {
                state: QueryState::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn timeout_cancels_remote_execution() {
        let engine = ScriptedEngine::new(Vec::new());
        let clock = FakeClock::new();
        let config = QueryRunnerConfig {
            max_wait: Duration::from_secs(10),
            ..config()
        };

        let error =
            start_and_wait(&config, &engine, &clock).expect_err("query should time out");

        match error {
            QueryRunnerError::Timeout { query_id, waited } => {
                assert_eq!(query_id, "query-123");
                assert!(waited > config.max_wait);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(engine.cancelled(), vec!["query-123".to_string()]);
        assert_eq!(clock.recorded_sleeps().len(), 4);
    }

    #[test]
    fn submit_error_propagates_without_polling() {
        let mut engine = ScriptedEngine::new(Vec::new());
        engine.submit_result = Err("AccessDenied: not authorized".to_string());
        let clock = FakeClock::new();

        let error =
            handle_query_event(&config(), &engine, &clock).expect_err("submit should fail");

        assert_eq!(
            error,
            QueryRunnerError::Engine {
                message: "AccessDenied: not authorized".to_string(),
            }
        );
        assert!(clock.recorded_sleeps().is_empty());
    }

    #[test]
    fn poll_error_propagates_without_retry() {
        let engine = ScriptedEngine::new(vec![
            Ok(running()),
            Err("ThrottlingException".to_string()),
        ]);
        let clock = FakeClock::new();

        let error =
            handle_query_event(&config(), &engine, &clock).expect_err("poll should fail");

        assert_eq!(
            error,
            QueryRunnerError::Engine {
                message: "ThrottlingException".to_string(),
            }
        );
    }
}
