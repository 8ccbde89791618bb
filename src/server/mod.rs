//! Subscription protocol engine
//!
//! [`SubscriptionServer`] interprets graphql-ws messages for one connection at
//! a time and drives the lifecycle of every operation started on it:
//!
//! ```text
//! OPENING -> ACKED (or REJECTED) -> ACTIVE -> CLOSED
//! ```
//!
//! Dispatch runs on the connection's own task. Each `start` gets a separate
//! task that executes the request and streams its results, so operations on
//! one connection interleave freely while frames of a single operation stay
//! ordered.

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::connection::{ConnectionContext, ConnectionState, RequestContext, Transport};
use crate::error::{ConnectError, ProtocolError};
use crate::execution::{ExecutionParams, Executor};
use crate::protocol::{
    ClientMessage, ErrorPayload, ServerMessage, StartPayload, CLOSE_CODE_POLICY_VIOLATION,
};

/// Engine settings
#[derive(Debug, Clone)]
pub struct ProtocolOptions {
    /// Interval between `ka` messages after `connection_ack`; `None` disables
    pub keep_alive: Option<Duration>,
    /// Upper bound for the `on_open` hook
    pub open_timeout: Duration,
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            keep_alive: None,
            open_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection-level extension points
#[async_trait]
pub trait ConnectionHooks: Send + Sync {
    /// Called once right after accept. Bounded by `open_timeout`.
    async fn on_open(&self, _ctx: &ConnectionContext) {}

    /// Validate `connection_init`; an error rejects and closes the connection
    async fn on_connect(
        &self,
        _ctx: &ConnectionContext,
        _payload: Option<&Value>,
    ) -> Result<(), ConnectError> {
        Ok(())
    }
}

/// Hooks that accept every connection
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ConnectionHooks for AcceptAll {}

/// graphql-ws protocol engine
#[derive(Clone)]
pub struct SubscriptionServer {
    executor: Arc<dyn Executor>,
    hooks: Arc<dyn ConnectionHooks>,
    options: ProtocolOptions,
}

impl SubscriptionServer {
    /// Create an engine that accepts every connection
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            hooks: Arc::new(AcceptAll),
            options: ProtocolOptions::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ConnectionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_options(mut self, options: ProtocolOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ProtocolOptions {
        &self.options
    }

    /// Create the context for a freshly accepted socket and run `on_open`
    pub async fn handle(
        &self,
        transport: Box<dyn Transport>,
        request_context: RequestContext,
    ) -> Arc<ConnectionContext> {
        let ctx = Arc::new(ConnectionContext::new(transport, request_context));
        self.on_open(&ctx).await;
        ctx
    }

    pub async fn on_open(&self, ctx: &Arc<ConnectionContext>) {
        info!(conn_id = ctx.id(), "connection opened");
        let open = tokio::time::timeout(self.options.open_timeout, self.hooks.on_open(ctx));
        if open.await.is_err() {
            warn!(
                conn_id = ctx.id(),
                timeout_ms = self.options.open_timeout.as_millis() as u64,
                "on_open hook timed out"
            );
        }
    }

    /// Decode one inbound frame and dispatch it
    pub async fn on_message(&self, ctx: &Arc<ConnectionContext>, raw: &str) {
        let message = match ClientMessage::parse(raw) {
            Ok(message) => message,
            Err(rejected) => {
                debug!(conn_id = ctx.id(), error = %rejected.error, "rejected client message");
                self.send_error(ctx, rejected.id, &rejected.error).await;
                return;
            }
        };
        trace!(conn_id = ctx.id(), message_type = message.message_type(), "dispatch");

        match message {
            ClientMessage::ConnectionInit { id, payload } => {
                self.on_connection_init(ctx, id, payload).await
            }
            ClientMessage::Start { id, payload } => self.on_start(ctx, id, payload).await,
            ClientMessage::Stop { id } => self.on_stop(ctx, &id).await,
            ClientMessage::ConnectionTerminate => self.on_connection_terminate(ctx).await,
        }
    }

    pub async fn on_connection_init(
        &self,
        ctx: &Arc<ConnectionContext>,
        op_id: Option<String>,
        payload: Option<Value>,
    ) {
        match self.hooks.on_connect(ctx, payload.as_ref()).await {
            Ok(()) => {
                if ctx.state() == ConnectionState::Opening {
                    ctx.set_state(ConnectionState::Acked);
                }
                let first_ack = ctx.mark_acked();
                if let Err(err) = ctx.send(ServerMessage::ConnectionAck).await {
                    debug!(conn_id = ctx.id(), error = %err, "failed to send connection_ack");
                    return;
                }
                info!(conn_id = ctx.id(), "connection acknowledged");
                if let (true, Some(interval)) = (first_ack, self.options.keep_alive) {
                    spawn_keep_alive(Arc::clone(ctx), interval);
                }
            }
            Err(err) => {
                warn!(conn_id = ctx.id(), error = %err, "connection_init rejected");
                ctx.set_state(ConnectionState::Rejected);
                let message = ServerMessage::ConnectionError {
                    id: op_id,
                    payload: ErrorPayload::new(ProtocolError::ConnectInit(err).to_string()),
                };
                if let Err(err) = ctx.send(message).await {
                    debug!(conn_id = ctx.id(), error = %err, "failed to send connection_error");
                }
                if let Err(err) = ctx.close(CLOSE_CODE_POLICY_VIOLATION).await {
                    debug!(conn_id = ctx.id(), error = %err, "failed to close transport");
                }
            }
        }
    }

    /// Reserve the id and hand the operation to its own task
    pub async fn on_start(&self, ctx: &Arc<ConnectionContext>, op_id: String, payload: StartPayload) {
        match ctx.state() {
            ConnectionState::Rejected | ConnectionState::Closed => {
                debug!(conn_id = ctx.id(), op_id = %op_id, "ignoring start on a closed connection");
                return;
            }
            _ => ctx.set_state(ConnectionState::Active),
        }

        let handle = match ctx.registry().reserve(&op_id) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(conn_id = ctx.id(), op_id = %op_id, "operation id already in use");
                self.send_error(ctx, Some(op_id), &err).await;
                return;
            }
        };

        debug!(conn_id = ctx.id(), op_id = %op_id, serial = handle.serial(), "operation started");
        let finished = handle.finish_guard();
        let params = ExecutionParams::from(payload);
        let server = self.clone();
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            let _finished = finished;
            server.run_operation(ctx, op_id, handle, params).await;
        });
    }

    /// Dispose the operation if it is live; always answer with `complete`
    pub async fn on_stop(&self, ctx: &Arc<ConnectionContext>, op_id: &str) {
        // Remove before disposing so the operation task cannot also complete it.
        match ctx.registry().remove(op_id) {
            Some(handle) => {
                handle.dispose();
                debug!(conn_id = ctx.id(), op_id, "operation stopped");
            }
            None => debug!(conn_id = ctx.id(), op_id, "stop for unknown operation"),
        }

        let complete = ServerMessage::Complete {
            id: op_id.to_string(),
        };
        if let Err(err) = ctx.send(complete).await {
            debug!(conn_id = ctx.id(), op_id, error = %err, "failed to send complete");
        }
    }

    pub async fn on_connection_terminate(&self, ctx: &Arc<ConnectionContext>) {
        info!(conn_id = ctx.id(), "client terminated connection");
        if let Err(err) = ctx.close(CLOSE_CODE_POLICY_VIOLATION).await {
            debug!(conn_id = ctx.id(), error = %err, "failed to close transport");
        }
    }

    /// Tear down after the socket is gone
    ///
    /// Every registered operation is disposed concurrently; returns once all
    /// of their tasks have exited.
    pub async fn on_close(&self, ctx: &Arc<ConnectionContext>) {
        ctx.mark_disconnected();
        let operations = ctx.registry().drain();
        let count = operations.len();

        let disposals = operations.into_iter().map(|(op_id, handle)| async move {
            handle.dispose();
            handle.finished().await;
            trace!(op_id = %op_id, "operation disposed");
        });
        future::join_all(disposals).await;

        info!(conn_id = ctx.id(), operations = count, "connection closed");
    }

    async fn send_error(
        &self,
        ctx: &ConnectionContext,
        op_id: Option<String>,
        error: &ProtocolError,
    ) {
        let message = ServerMessage::Error {
            id: op_id,
            payload: ErrorPayload::new(error.to_string()),
        };
        if let Err(err) = ctx.send(message).await {
            debug!(conn_id = ctx.id(), error = %err, "failed to send error");
        }
    }
}

fn spawn_keep_alive(ctx: Arc<ConnectionContext>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if ctx.is_closed() || ctx.send(ServerMessage::KeepAlive).await.is_err() {
                break;
            }
        }
        trace!(conn_id = ctx.id(), "keep-alive stopped");
    });
}
