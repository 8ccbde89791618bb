//! Outbound half of an axum websocket

use std::borrow::Cow;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;

use crate::connection::Transport;
use crate::error::TransportError;

pub struct WsTransport {
    sink: SplitSink<WebSocket, Message>,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
