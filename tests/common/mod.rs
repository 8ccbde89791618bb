//! Shared fixtures for protocol tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use graphql_ws_server::connection::{ConnectionContext, RequestContext, Transport};
use graphql_ws_server::error::{ExecutionError, TransportError};
use graphql_ws_server::execution::{ExecutionParams, ExecutionResult, Executor, Response};
use graphql_ws_server::protocol::ResultValue;
use graphql_ws_server::server::SubscriptionServer;

pub const WAIT: Duration = Duration::from_secs(2);
pub const QUIET: Duration = Duration::from_millis(100);

/// What the server pushed through the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(Value),
    Close(u16),
}

/// Transport that forwards frames to a channel
pub struct MockTransport {
    tx: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let value: Value = serde_json::from_str(&text).expect("server sent invalid JSON");
        self.tx
            .send(Frame::Message(value))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<(), TransportError> {
        self.tx.send(Frame::Close(code)).map_err(|_| TransportError::Closed)
    }
}

/// One connection driven by hand
pub struct Harness {
    pub server: SubscriptionServer,
    pub ctx: Arc<ConnectionContext>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl Harness {
    pub async fn open(server: SubscriptionServer) -> Self {
        Self::open_with(server, RequestContext::new()).await
    }

    pub async fn open_with(server: SubscriptionServer, request_context: RequestContext) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = server
            .handle(Box::new(MockTransport { tx }), request_context)
            .await;
        Self { server, ctx, rx }
    }

    pub async fn send(&self, message: Value) {
        self.server.on_message(&self.ctx, &message.to_string()).await;
    }

    pub async fn send_raw(&self, raw: &str) {
        self.server.on_message(&self.ctx, raw).await;
    }

    pub async fn init(&mut self) {
        self.send(json!({"type": "connection_init", "payload": {}})).await;
        let ack = self.next_message().await;
        assert_eq!(ack["type"], "connection_ack");
    }

    pub async fn start(&self, id: &str, query: &str) {
        self.send(json!({"id": id, "type": "start", "payload": {"query": query}}))
            .await;
    }

    pub async fn stop(&self, id: &str) {
        self.send(json!({"id": id, "type": "stop"})).await;
    }

    pub async fn close(&self) {
        self.server.on_close(&self.ctx).await;
    }

    /// Next frame, failing the test after `WAIT`
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("transport channel closed")
    }

    pub async fn next_message(&mut self) -> Value {
        match self.next_frame().await {
            Frame::Message(value) => value,
            Frame::Close(code) => panic!("expected a message, got close {}", code),
        }
    }

    /// Skip frames until one matches `type` and `id`
    pub async fn next_matching(&mut self, message_type: &str, id: &str) -> Value {
        loop {
            let message = self.next_message().await;
            if message["type"] == message_type && message["id"] == id {
                return message;
            }
        }
    }

    /// Skip frames until one has the given `type`
    pub async fn next_matching_type(&mut self, message_type: &str) -> Value {
        loop {
            let message = self.next_message().await;
            if message["type"] == message_type {
                return message;
            }
        }
    }

    /// Everything sent during the next `QUIET` period
    pub async fn drain_quiet(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = tokio::time::timeout(QUIET, self.rx.recv()).await {
            frames.push(frame);
        }
        frames
    }
}

/// Counts drops of the values it hands out
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicUsize>);

impl DropCounter {
    pub fn probe(&self) -> DropProbe {
        DropProbe(self.0.clone())
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct DropProbe(Arc<AtomicUsize>);

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Executor with canned behaviors keyed by the root field in the query
///
/// - `ticks`: endless subscription, one `{ticks: n}` every 10ms
/// - `pair`: subscription with two events
/// - `hello`: query returning `{hello: "world"}`
/// - `later`: query whose field is deferred
/// - `lazy`: query whose field resolves after 50ms
/// - `stuck`: query whose deferred field never resolves
/// - `slow`: query that never finishes
/// - `fail`: execution error `boom`
/// - `explode`: panics inside the operation task
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    /// Incremented when a `ticks` stream, `slow` query or `stuck` field is dropped
    pub released: DropCounter,
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(
        &self,
        _request_context: &RequestContext,
        params: ExecutionParams,
    ) -> Result<ExecutionResult, ExecutionError> {
        let query = params.query.as_str();
        if query.contains("ticks") {
            let probe = self.released.probe();
            let stream = async_stream::stream! {
                let _probe = probe;
                let mut n = 0i64;
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    n += 1;
                    yield Response::data(json!({"ticks": n}));
                }
            };
            Ok(ExecutionResult::Stream(stream.boxed()))
        } else if query.contains("pair") {
            let stream = futures::stream::iter(vec![
                Response::data(json!({"pair": 1})),
                Response::data(json!({"pair": 2})),
            ]);
            Ok(ExecutionResult::Stream(stream.boxed()))
        } else if query.contains("hello") {
            Ok(ExecutionResult::Single(Response::data(json!({"hello": "world"}))))
        } else if query.contains("later") {
            let value = ResultValue::deferred(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ResultValue::from("done")
            });
            Ok(ExecutionResult::Single(Response::data(ResultValue::object([(
                "later", value,
            )]))))
        } else if query.contains("lazy") {
            let value = ResultValue::deferred(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ResultValue::from("late")
            });
            Ok(ExecutionResult::Single(Response::data(ResultValue::object([(
                "lazy", value,
            )]))))
        } else if query.contains("stuck") {
            let probe = self.released.probe();
            let value = ResultValue::deferred(async move {
                let _probe = probe;
                std::future::pending::<ResultValue>().await
            });
            Ok(ExecutionResult::Single(Response::data(ResultValue::object([(
                "stuck", value,
            )]))))
        } else if query.contains("slow") {
            let _probe = self.released.probe();
            std::future::pending::<()>().await;
            unreachable!()
        } else if query.contains("explode") {
            panic!("resolver exploded");
        } else {
            Err(ExecutionError::new("boom"))
        }
    }
}

pub fn scripted_server() -> (SubscriptionServer, DropCounter) {
    let executor = ScriptedExecutor::default();
    let released = executor.released.clone();
    (SubscriptionServer::new(Arc::new(executor)), released)
}
