//! Demo executor used by the `gql-ws-server` binary
//!
//! Supports two root fields, matched by name in the request text:
//!
//! - `subscription { countSeconds }` emits `1, 2, ... upTo` once per tick
//!   (`upTo` variable, default 5)
//! - `query { serverTime }` returns the current time as a deferred value

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::connection::RequestContext;
use crate::error::ExecutionError;
use crate::execution::{ExecutionParams, ExecutionResult, Executor, Response};
use crate::protocol::ResultValue;

pub const DEFAULT_COUNT_UP_TO: u64 = 5;

#[derive(Debug, Clone)]
pub struct DemoExecutor {
    tick: Duration,
}

impl DemoExecutor {
    pub fn new() -> Self {
        Self {
            tick: Duration::from_secs(1),
        }
    }

    /// Use a different period for `countSeconds`
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    fn count_seconds(&self, params: &ExecutionParams) -> Result<ExecutionResult, ExecutionError> {
        let up_to = match params.variables.get("upTo") {
            None => DEFAULT_COUNT_UP_TO,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| ExecutionError::new("Variable \"upTo\" must be a non-negative integer"))?,
        };
        let tick = self.tick;

        let stream = async_stream::stream! {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            for n in 1..=up_to {
                ticker.tick().await;
                yield Response::data(ResultValue::object([("countSeconds", ResultValue::from(n as i64))]));
            }
        };
        Ok(ExecutionResult::Stream(stream.boxed()))
    }

    fn server_time(&self) -> ExecutionResult {
        let now = ResultValue::deferred(async {
            tokio::task::yield_now().await;
            ResultValue::from(chrono::Utc::now().to_rfc3339())
        });
        ExecutionResult::Single(Response::data(ResultValue::object([("serverTime", now)])))
    }
}

impl Default for DemoExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for DemoExecutor {
    async fn execute(
        &self,
        _request_context: &RequestContext,
        params: ExecutionParams,
    ) -> Result<ExecutionResult, ExecutionError> {
        debug!(operation = ?params.operation_name, "executing demo request");
        if params.query.contains("countSeconds") {
            self.count_seconds(&params)
        } else if params.query.contains("serverTime") {
            Ok(self.server_time())
        } else {
            Err(ExecutionError::new(
                "Unsupported operation: expected countSeconds or serverTime",
            ))
        }
    }
}
