//! WebSocket connection handler

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{FutureExt, StreamExt};
use tracing::{debug, error};

use super::state::AppState;
use super::transport::WsTransport;
use crate::connection::RequestContext;
use crate::protocol::SUBPROTOCOL;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let request_context = request_context(&headers, params);
    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state, request_context))
}

fn request_context(headers: &HeaderMap, query: HashMap<String, String>) -> RequestContext {
    let mut ctx = RequestContext::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            ctx = ctx.with_header(name.as_str(), value);
        }
    }
    ctx.query = query;
    ctx
}

/// Handle an individual WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, request_context: RequestContext) {
    let _guard = state.track_connection();
    let (sink, mut stream) = socket.split();
    let server = &state.server;
    let ctx = server
        .handle(Box::new(WsTransport::new(sink)), request_context)
        .await;

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            // axum answers pings itself
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(err) => {
                debug!(conn_id = ctx.id(), error = %err, "websocket error");
                break;
            }
        };

        let handled = AssertUnwindSafe(server.on_message(&ctx, &text))
            .catch_unwind()
            .await;
        if handled.is_err() {
            error!(conn_id = ctx.id(), "message handler panicked; dropping connection");
            break;
        }
        if ctx.is_closed() {
            break;
        }
    }

    server.on_close(&ctx).await;
}
