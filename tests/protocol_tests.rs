//! Protocol engine tests over a mock transport

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use common::{scripted_server, Frame, Harness, ScriptedExecutor};
use graphql_ws_server::connection::{ConnectionContext, ConnectionState, RequestContext};
use graphql_ws_server::error::ConnectError;
use graphql_ws_server::server::{ConnectionHooks, ProtocolOptions, SubscriptionServer};
use graphql_ws_server::JwtAuth;

struct RejectAll;

#[async_trait]
impl ConnectionHooks for RejectAll {
    async fn on_connect(
        &self,
        _ctx: &ConnectionContext,
        _payload: Option<&Value>,
    ) -> Result<(), ConnectError> {
        Err(ConnectError::new("not allowed"))
    }
}

struct SlowOpen;

#[async_trait]
impl ConnectionHooks for SlowOpen {
    async fn on_open(&self, _ctx: &ConnectionContext) {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
}

fn messages(frames: &[Frame]) -> Vec<&Value> {
    frames
        .iter()
        .filter_map(|frame| match frame {
            Frame::Message(value) => Some(value),
            Frame::Close(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn test_connection_init_is_acked() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;

    conn.send(json!({"type": "connection_init"})).await;

    assert_eq!(conn.next_message().await, json!({"type": "connection_ack"}));
    assert_eq!(conn.ctx.state(), ConnectionState::Acked);
}

#[tokio::test]
async fn test_rejected_init_closes_with_1011() {
    let (server, _) = scripted_server();
    let server = server.with_hooks(Arc::new(RejectAll));
    let mut conn = Harness::open(server).await;

    conn.send(json!({"type": "connection_init", "payload": {}})).await;

    let error = conn.next_message().await;
    assert_eq!(error["type"], "connection_error");
    assert_eq!(error["payload"]["message"], "not allowed");
    assert_eq!(conn.next_frame().await, Frame::Close(1011));

    // Starts after rejection are ignored
    conn.start("1", "{ hello }").await;
    assert!(conn.drain_quiet().await.is_empty());
    assert!(conn.ctx.registry().is_empty());
}

#[tokio::test]
async fn test_query_sends_data_then_complete() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("1", "{ hello }").await;

    assert_eq!(
        conn.next_message().await,
        json!({"id": "1", "type": "data", "payload": {"data": {"hello": "world"}}})
    );
    assert_eq!(conn.next_message().await, json!({"id": "1", "type": "complete"}));
    assert!(conn.drain_quiet().await.is_empty());
    assert!(!conn.ctx.registry().has("1"));
}

#[tokio::test]
async fn test_deferred_fields_are_resolved_before_sending() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("q", "{ later }").await;

    let data = conn.next_matching("data", "q").await;
    assert_eq!(data["payload"], json!({"data": {"later": "done"}}));
    conn.next_matching("complete", "q").await;
}

#[tokio::test]
async fn test_subscription_completes_when_stream_ends() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("s", "subscription { pair }").await;

    assert_eq!(conn.next_message().await["payload"]["data"]["pair"], 1);
    assert_eq!(conn.next_message().await["payload"]["data"]["pair"], 2);
    assert_eq!(conn.next_message().await, json!({"id": "s", "type": "complete"}));
}

#[tokio::test]
async fn test_duplicate_start_is_rejected() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("1", "subscription { ticks }").await;
    conn.start("1", "subscription { ticks }").await;

    let error = conn.next_matching("error", "1").await;
    assert_eq!(error["payload"]["message"], "Operation id '1' is already in use");
    assert_eq!(conn.ctx.registry().len(), 1);

    conn.close().await;
}

#[tokio::test]
async fn test_stop_ends_subscription_with_one_complete() {
    let (server, released) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("1", "subscription { ticks }").await;
    conn.next_matching("data", "1").await;

    conn.stop("1").await;

    let frames = conn.drain_quiet().await;
    let after_stop = messages(&frames);
    let completes = after_stop
        .iter()
        .filter(|m| m["type"] == "complete" && m["id"] == "1")
        .count();
    assert_eq!(completes, 1);

    // Nothing for the operation follows its complete
    let complete_at = after_stop
        .iter()
        .position(|m| m["type"] == "complete")
        .unwrap();
    assert!(after_stop[complete_at + 1..].is_empty());

    assert_eq!(released.count(), 1);
    assert!(conn.ctx.registry().is_empty());
}

#[tokio::test]
async fn test_stop_cancels_pending_query() {
    let (server, released) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("q", "{ slow }").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    conn.stop("q").await;

    assert_eq!(conn.next_message().await, json!({"id": "q", "type": "complete"}));
    assert!(conn.drain_quiet().await.is_empty());
    assert_eq!(released.count(), 1);
}

#[tokio::test]
async fn test_stop_while_deferred_resolves_suppresses_data() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("d", "{ lazy }").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    conn.stop("d").await;

    let frames = conn.drain_quiet().await;
    let sent = messages(&frames);
    assert_eq!(sent, vec![&json!({"id": "d", "type": "complete"})]);
}

#[tokio::test]
async fn test_id_reused_right_after_stop_gets_only_new_frames() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("d", "{ lazy }").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    conn.stop("d").await;
    conn.start("d", "{ hello }").await;

    let frames = conn.drain_quiet().await;
    let sent = messages(&frames);
    assert_eq!(
        sent,
        vec![
            &json!({"id": "d", "type": "complete"}),
            &json!({"id": "d", "type": "data", "payload": {"data": {"hello": "world"}}}),
            &json!({"id": "d", "type": "complete"}),
        ]
    );
}

#[tokio::test]
async fn test_close_does_not_wait_on_unresolved_deferred_value() {
    let (server, released) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("1", "{ stuck }").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), conn.close())
        .await
        .expect("close waited on an unresolved deferred value");
    assert_eq!(released.count(), 1);
    assert!(conn.drain_quiet().await.is_empty());
}

#[tokio::test]
async fn test_stop_releases_unresolved_deferred_value() {
    let (server, released) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("1", "{ stuck }").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.stop("1").await;

    assert_eq!(conn.next_message().await, json!({"id": "1", "type": "complete"}));
    assert!(conn.drain_quiet().await.is_empty());
    assert_eq!(released.count(), 1);
}

#[tokio::test]
async fn test_stop_unknown_operation_still_completes() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.stop("nope").await;

    assert_eq!(conn.next_message().await, json!({"id": "nope", "type": "complete"}));
}

#[tokio::test]
async fn test_id_can_be_reused_after_stop() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("1", "subscription { ticks }").await;
    conn.next_matching("data", "1").await;
    conn.stop("1").await;
    conn.next_matching("complete", "1").await;

    conn.start("1", "{ hello }").await;
    let data = conn.next_matching("data", "1").await;
    assert_eq!(data["payload"]["data"]["hello"], "world");
}

#[tokio::test]
async fn test_execution_error_is_reported() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("e", "{ unknown }").await;

    assert_eq!(
        conn.next_message().await,
        json!({"id": "e", "type": "error", "payload": {"message": "boom"}})
    );
    assert!(conn.drain_quiet().await.is_empty());
    assert!(conn.ctx.registry().is_empty());
}

#[tokio::test]
async fn test_panicking_operation_does_not_kill_connection() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.start("p", "{ explode }").await;
    let error = conn.next_matching("error", "p").await;
    assert_eq!(error["payload"]["message"], "Internal server error");

    conn.start("ok", "{ hello }").await;
    conn.next_matching("complete", "ok").await;
}

#[tokio::test]
async fn test_invalid_messages_get_error_frames() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;

    conn.send_raw("this is not json").await;
    let error = conn.next_message().await;
    assert_eq!(error["type"], "error");
    assert!(error.get("id").is_none());

    conn.send(json!({"id": "7", "type": "subscribe"})).await;
    let error = conn.next_message().await;
    assert_eq!(error["id"], "7");
    assert_eq!(error["payload"]["message"], "Invalid message type: subscribe");

    assert!(!conn.ctx.is_closed());
}

#[tokio::test]
async fn test_terminate_closes_transport() {
    let (server, _) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    conn.send(json!({"type": "connection_terminate"})).await;

    assert_eq!(conn.next_frame().await, Frame::Close(1011));
    assert!(conn.ctx.is_closed());
}

#[tokio::test]
async fn test_close_disposes_every_operation_once() {
    let (server, released) = scripted_server();
    let mut conn = Harness::open(server).await;
    conn.init().await;

    for id in ["a", "b", "c"] {
        conn.start(id, "subscription { ticks }").await;
    }
    for id in ["a", "b", "c"] {
        conn.next_matching("data", id).await;
    }

    conn.close().await;

    assert_eq!(released.count(), 3);
    assert!(conn.ctx.registry().is_empty());
    assert_eq!(conn.ctx.state(), ConnectionState::Closed);

    // Frames already in the channel may remain; nothing new arrives
    conn.drain_quiet().await;
    assert!(conn.drain_quiet().await.is_empty());
}

#[tokio::test]
async fn test_keep_alive_after_ack() {
    let (server, _) = scripted_server();
    let server = server.with_options(ProtocolOptions {
        keep_alive: Some(Duration::from_millis(20)),
        ..ProtocolOptions::default()
    });
    let mut conn = Harness::open(server).await;

    // No keep-alive before the ack
    assert!(conn.drain_quiet().await.is_empty());

    conn.init().await;
    assert_eq!(conn.next_message().await, json!({"type": "ka"}));
    assert_eq!(conn.next_message().await, json!({"type": "ka"}));

    conn.close().await;
}

#[tokio::test]
async fn test_keep_alive_when_init_follows_start() {
    let (server, _) = scripted_server();
    let server = server.with_options(ProtocolOptions {
        keep_alive: Some(Duration::from_millis(20)),
        ..ProtocolOptions::default()
    });
    let mut conn = Harness::open(server).await;

    conn.start("1", "{ hello }").await;
    conn.next_matching("complete", "1").await;

    conn.init().await;
    assert_eq!(conn.ctx.state(), ConnectionState::Active);
    assert!(conn.ctx.is_acked());
    assert_eq!(conn.next_message().await, json!({"type": "ka"}));

    // A second init acks again without a second keep-alive task
    conn.send(json!({"type": "connection_init"})).await;
    conn.next_matching_type("connection_ack").await;

    conn.close().await;
}

#[tokio::test]
async fn test_slow_on_open_is_bounded() {
    let server = SubscriptionServer::new(Arc::new(ScriptedExecutor::default()))
        .with_hooks(Arc::new(SlowOpen))
        .with_options(ProtocolOptions {
            open_timeout: Duration::from_millis(20),
            ..ProtocolOptions::default()
        });

    let mut conn = tokio::time::timeout(Duration::from_secs(1), Harness::open(server))
        .await
        .expect("on_open was not bounded");
    conn.init().await;
}

#[tokio::test]
async fn test_jwt_hook_accepts_valid_token() {
    let secret = "integration-secret-that-is-long-enough-for-hs256";
    let auth = JwtAuth::new(secret).unwrap();
    let token = auth.generate_token("alice").unwrap();

    let (server, _) = scripted_server();
    let server = server.with_hooks(Arc::new(auth));

    let mut conn = Harness::open(server.clone()).await;
    conn.send(json!({"type": "connection_init", "payload": {"authToken": &token}}))
        .await;
    assert_eq!(conn.next_message().await["type"], "connection_ack");

    let request = RequestContext::new().with_header("Authorization", format!("Bearer {}", token));
    let mut conn = Harness::open_with(server.clone(), request).await;
    conn.send(json!({"type": "connection_init"})).await;
    assert_eq!(conn.next_message().await["type"], "connection_ack");

    let mut conn = Harness::open(server).await;
    conn.send(json!({"type": "connection_init", "payload": {"authToken": "garbage"}}))
        .await;
    assert_eq!(conn.next_message().await["type"], "connection_error");
    assert_eq!(conn.next_frame().await, Frame::Close(1011));
}
