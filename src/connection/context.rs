//! Per-socket connection state

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::registry::{OperationHandle, OperationRegistry};
use crate::error::{ProtocolResult, TransportError};
use crate::protocol::{encode, ServerMessage};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Outbound half of a websocket
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the socket with a status code
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Ambient request data captured when the socket was accepted
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Request headers, names lowercased
    pub headers: HashMap<String, String>,
    /// Query string parameters
    pub query: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Token from `Authorization: Bearer <token>` or the `token` query parameter
    pub fn bearer_token(&self) -> Option<&str> {
        if let Some(header) = self.header("authorization") {
            return Some(header.strip_prefix("Bearer ").unwrap_or(header));
        }
        self.query.get("token").map(String::as_str)
    }
}

/// Lifecycle of one connection
///
/// States only move forward. A connection that starts operations before
/// `connection_init` goes straight to `Active` and stays there when acked;
/// whether an ack was sent is tracked by [`ConnectionContext::mark_acked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, nothing handled yet
    Opening,
    /// `connection_ack` sent, no operation started
    Acked,
    /// `on_connect` failed; the transport is being closed
    Rejected,
    /// An operation has been started
    Active,
    Closed,
}

/// Transport handle, request context and operation registry of one socket
pub struct ConnectionContext {
    id: String,
    transport: tokio::sync::Mutex<Box<dyn Transport>>,
    closed: AtomicBool,
    acked: AtomicBool,
    request_context: RequestContext,
    registry: OperationRegistry,
    state: Mutex<ConnectionState>,
}

impl ConnectionContext {
    pub fn new(transport: Box<dyn Transport>, request_context: RequestContext) -> Self {
        let seq = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("conn_{:x}", seq),
            transport: tokio::sync::Mutex::new(transport),
            closed: AtomicBool::new(false),
            acked: AtomicBool::new(false),
            request_context,
            registry: OperationRegistry::new(),
            state: Mutex::new(ConnectionState::Opening),
        }
    }

    /// Identifier used in logs
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request_context(&self) -> &RequestContext {
        &self.request_context
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next`; a closed connection stays closed
    pub fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Closed {
            *state = next;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Record a `connection_ack`; returns `true` only for the first one
    pub fn mark_acked(&self) -> bool {
        !self.acked.swap(true, Ordering::SeqCst)
    }

    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::SeqCst)
    }

    /// Encode and send a message
    pub async fn send(&self, message: ServerMessage) -> ProtocolResult<()> {
        let message_type = message.message_type();
        let text = encode(&message.into_envelope()).await?;
        trace!(conn_id = %self.id, message_type, "sending message");
        self.send_text(text).await
    }

    /// Send an already encoded frame
    pub async fn send_text(&self, text: String) -> ProtocolResult<()> {
        let mut transport = self.transport.lock().await;
        if self.is_closed() {
            return Err(TransportError::Closed.into());
        }
        transport.send(text).await?;
        Ok(())
    }

    /// Send a message on behalf of an operation
    ///
    /// The frame goes out only if `handle` still owns `op_id` when the
    /// transport is acquired; returns whether it was sent. Encoding happens
    /// before the check, so a stop arriving while deferred values resolve
    /// suppresses the frame. Disposal also abandons the wait on deferred
    /// values.
    pub async fn send_for_operation(
        &self,
        op_id: &str,
        handle: &OperationHandle,
        message: ServerMessage,
    ) -> ProtocolResult<bool> {
        let envelope = message.into_envelope();
        let text = tokio::select! {
            biased;
            _ = handle.disposed() => {
                trace!(conn_id = %self.id, op_id, "operation disposed while encoding");
                return Ok(false);
            }
            text = encode(&envelope) => text?,
        };
        let mut transport = self.transport.lock().await;
        if self.is_closed() || !self.registry.is_current(op_id, handle) {
            trace!(conn_id = %self.id, op_id, "operation gone, dropping frame");
            return Ok(false);
        }
        transport.send(text).await?;
        Ok(true)
    }

    /// Retire an operation and send its final message
    ///
    /// Removal and send happen under the transport lock, so a later start
    /// reusing the id cannot slip a frame in between. Returns `false` when the
    /// operation had already been removed (stopped or closed).
    pub async fn finish_operation(
        &self,
        op_id: &str,
        handle: &OperationHandle,
        message: ServerMessage,
    ) -> ProtocolResult<bool> {
        let text = encode(&message.into_envelope()).await?;
        let mut transport = self.transport.lock().await;
        if !self.registry.remove_if_current(op_id, handle) {
            return Ok(false);
        }
        if self.is_closed() {
            return Err(TransportError::Closed.into());
        }
        transport.send(text).await?;
        Ok(true)
    }

    /// Close the transport; only the first call reaches it
    pub async fn close(&self, code: u16) -> ProtocolResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.set_state(ConnectionState::Closed);
        debug!(conn_id = %self.id, code, "closing transport");
        let mut transport = self.transport.lock().await;
        transport.close(code, "").await?;
        Ok(())
    }

    /// Record that the peer went away; returns `false` if already closed
    pub fn mark_disconnected(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Closed);
        first
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("operations", &self.registry.len())
            .finish()
    }
}
