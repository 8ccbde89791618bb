//! Operation task
//!
//! Runs one started operation: executes the request, forwards its results
//! and retires the registry entry. A stop is observed between results only;
//! a result that already passed the membership check is still delivered.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tracing::{debug, error, trace};

use super::SubscriptionServer;
use crate::connection::{ConnectionContext, OperationHandle};
use crate::error::{ProtocolError, ProtocolResult};
use crate::execution::{ExecutionParams, ExecutionResult, Response};
use crate::protocol::{ErrorPayload, ServerMessage};

impl SubscriptionServer {
    pub(super) async fn run_operation(
        self,
        ctx: Arc<ConnectionContext>,
        op_id: String,
        handle: OperationHandle,
        params: ExecutionParams,
    ) {
        let outcome = AssertUnwindSafe(self.drive_operation(&ctx, &op_id, &handle, params))
            .catch_unwind()
            .await;

        let last = match outcome {
            Ok(Ok(())) => ServerMessage::Complete { id: op_id.clone() },
            Ok(Err(ProtocolError::Transport(err))) => {
                debug!(conn_id = ctx.id(), op_id = %op_id, error = %err, "transport gone during operation");
                ServerMessage::Complete { id: op_id.clone() }
            }
            Ok(Err(err)) => {
                debug!(conn_id = ctx.id(), op_id = %op_id, error = %err, "operation failed");
                ServerMessage::Error {
                    id: Some(op_id.clone()),
                    payload: ErrorPayload::new(err.to_string()),
                }
            }
            Err(panic) => {
                error!(
                    conn_id = ctx.id(),
                    op_id = %op_id,
                    panic = panic_message(panic.as_ref()),
                    "operation task panicked"
                );
                ServerMessage::Error {
                    id: Some(op_id.clone()),
                    payload: ErrorPayload::new("Internal server error"),
                }
            }
        };

        match ctx.finish_operation(&op_id, &handle, last).await {
            Ok(true) => debug!(conn_id = ctx.id(), op_id = %op_id, "operation finished"),
            Ok(false) => trace!(conn_id = ctx.id(), op_id = %op_id, "operation was already retired"),
            Err(err) => debug!(conn_id = ctx.id(), op_id = %op_id, error = %err, "could not send final message"),
        }
    }

    async fn drive_operation(
        &self,
        ctx: &ConnectionContext,
        op_id: &str,
        handle: &OperationHandle,
        params: ExecutionParams,
    ) -> ProtocolResult<()> {
        let execution = tokio::select! {
            biased;
            _ = handle.disposed() => {
                debug!(conn_id = ctx.id(), op_id, "operation disposed before execution finished");
                return Ok(());
            }
            result = self.executor.execute(ctx.request_context(), params) => result?,
        };

        match execution {
            ExecutionResult::Single(response) => {
                send_result(ctx, op_id, handle, response).await?;
            }
            ExecutionResult::Stream(mut stream) => {
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = handle.disposed() => None,
                        item = stream.next() => item,
                    };
                    let Some(response) = next else {
                        break;
                    };
                    if !send_result(ctx, op_id, handle, response).await? {
                        break;
                    }
                }
                // Dropping the stream releases the subscription at its source.
                drop(stream);
            }
        }
        Ok(())
    }
}

/// Send a `data` frame if the operation is still live
async fn send_result(
    ctx: &ConnectionContext,
    op_id: &str,
    handle: &OperationHandle,
    response: Response,
) -> ProtocolResult<bool> {
    let message = ServerMessage::Data {
        id: op_id.to_string(),
        payload: response.into_payload(),
    };
    ctx.send_for_operation(op_id, handle, message).await
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
