use std::time::Duration;

use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use lakehouse_ingest_lambda::adapters::clock::SystemClock;
use lakehouse_ingest_lambda::adapters::query_engine::{QueryEngine, QueryStatusSnapshot};
use lakehouse_ingest_lambda::handlers::query_runner::{handle_query_event, QueryRunnerConfig};
use lakehouse_ingest_lambda::runtime::contract::{
    QueryRunReport, QueryState, QueryStatistics, DEFAULT_MAX_WAIT_SECONDS,
};

struct AthenaQueryEngine {
    athena_client: aws_sdk_athena::Client,
}

impl QueryEngine for AthenaQueryEngine {
    fn submit(
        &self,
        sql: &str,
        database: &str,
        workgroup: &str,
        output_location: Option<&str>,
    ) -> Result<String, String> {
        let client = self.athena_client.clone();
        let sql = sql.to_string();
        let database = database.to_string();
        let workgroup = workgroup.to_string();
        let output_location = output_location.map(str::to_string);

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let mut request = client
                    .start_query_execution()
                    .query_string(sql)
                    .query_execution_context(
                        QueryExecutionContext::builder().database(database).build(),
                    )
                    .work_group(workgroup);
                if let Some(location) = output_location {
                    request = request.result_configuration(
                        ResultConfiguration::builder()
                            .output_location(location)
                            .build(),
                    );
                }

                let output = request
                    .send()
                    .await
                    .map_err(|error| format!("failed to start query execution: {error}"))?;
                output
                    .query_execution_id()
                    .map(str::to_string)
                    .ok_or_else(|| "query execution id missing from start response".to_string())
            })
        })
    }

    fn describe(&self, query_id: &str) -> Result<QueryStatusSnapshot, String> {
        let client = self.athena_client.clone();
        let query_id = query_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .get_query_execution()
                    .query_execution_id(query_id)
                    .send()
                    .await
                    .map_err(|error| format!("failed to get query execution: {error}"))?;

                let execution = output
                    .query_execution()
                    .ok_or_else(|| "query execution missing from response".to_string())?;
                let status = execution
                    .status()
                    .ok_or_else(|| "query status missing from response".to_string())?;

                // Unknown states count as still in flight; the wall-clock
                // timeout bounds the poll loop either way.
                let state = match status.state() {
                    Some(QueryExecutionState::Queued) => QueryState::Pending,
                    Some(QueryExecutionState::Running) => QueryState::Running,
                    Some(QueryExecutionState::Succeeded) => QueryState::Succeeded,
                    Some(QueryExecutionState::Failed) => QueryState::Failed,
                    Some(QueryExecutionState::Cancelled) => QueryState::Cancelled,
                    _ => QueryState::Pending,
                };

                let statistics = execution.statistics().map(|statistics| QueryStatistics {
                    data_scanned_bytes: statistics.data_scanned_in_bytes().unwrap_or(0),
                    execution_time_ms: statistics.engine_execution_time_in_millis().unwrap_or(0),
                    total_time_ms: statistics.total_execution_time_in_millis().unwrap_or(0),
                });

                Ok(QueryStatusSnapshot {
                    state,
                    reason: status.state_change_reason().map(str::to_string),
                    statistics,
                })
            })
        })
    }

    fn cancel(&self, query_id: &str) -> Result<(), String> {
        let client = self.athena_client.clone();
        let query_id = query_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .stop_query_execution()
                    .query_execution_id(query_id)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to stop query execution: {error}"))
            })
        })
    }
}

async fn handle_request(_event: LambdaEvent<serde_json::Value>) -> Result<QueryRunReport, Error> {
    let database = std::env::var("A_DB").map_err(|_| Error::from("A_DB must be configured"))?;
    let workgroup = std::env::var("A_WG").map_err(|_| Error::from("A_WG must be configured"))?;
    let sql = std::env::var("A_SQL").map_err(|_| Error::from("A_SQL must be configured"))?;
    let output_location = std::env::var("A_OUTPUT").ok().filter(|value| !value.is_empty());
    let max_wait_seconds = std::env::var("A_MAX_WAIT_SECONDS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_MAX_WAIT_SECONDS);

    let config = QueryRunnerConfig {
        database,
        workgroup,
        sql,
        output_location,
        max_wait: Duration::from_secs(max_wait_seconds),
    };

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let engine = AthenaQueryEngine {
        athena_client: aws_sdk_athena::Client::new(&aws_config),
    };
    let clock = SystemClock::new();

    tokio::task::block_in_place(|| handle_query_event(&config, &engine, &clock))
        .map_err(|error| Error::from(error.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
