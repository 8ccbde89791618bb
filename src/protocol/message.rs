//! graphql-ws wire messages
//!
//! Every frame is an envelope `{ "id"?, "type", "payload"? }`. Inbound frames
//! are decoded in two steps so that a bad `type` can still be reported against
//! the id the client used.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::codec::ResultValue;
use crate::error::{ProtocolError, ProtocolResult};

/// Subprotocol advertised at websocket accept time
pub const SUBPROTOCOL: &str = "graphql-ws";

/// Close code used when `connection_init` fails or the client terminates
pub const CLOSE_CODE_POLICY_VIOLATION: u16 = 1011;

pub const GQL_CONNECTION_INIT: &str = "connection_init";
pub const GQL_START: &str = "start";
pub const GQL_STOP: &str = "stop";
pub const GQL_CONNECTION_TERMINATE: &str = "connection_terminate";
pub const GQL_CONNECTION_ACK: &str = "connection_ack";
pub const GQL_CONNECTION_ERROR: &str = "connection_error";
pub const GQL_CONNECTION_KEEP_ALIVE: &str = "ka";
pub const GQL_DATA: &str = "data";
pub const GQL_ERROR: &str = "error";
pub const GQL_COMPLETE: &str = "complete";

/// Raw inbound envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Payload of a `start` message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPayload {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    #[serde(
        rename = "operationName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

/// Decoded client message
#[derive(Debug, Clone)]
pub enum ClientMessage {
    ConnectionInit {
        id: Option<String>,
        payload: Option<Value>,
    },
    Start {
        id: String,
        payload: StartPayload,
    },
    Stop {
        id: String,
    },
    ConnectionTerminate,
}

/// A client frame that could not be decoded, with the id to report it under
#[derive(Debug)]
pub struct RejectedMessage {
    pub id: Option<String>,
    pub error: ProtocolError,
}

impl ClientMessage {
    /// Decode a raw text frame
    pub fn parse(raw: &str) -> Result<Self, RejectedMessage> {
        let envelope: Envelope = serde_json::from_str(raw).map_err(|e| RejectedMessage {
            id: None,
            error: ProtocolError::InvalidMessage(e.to_string()),
        })?;
        let id = envelope.id.clone();
        Self::from_envelope(envelope).map_err(|error| RejectedMessage { id, error })
    }

    /// Map an envelope to a typed message
    pub fn from_envelope(envelope: Envelope) -> ProtocolResult<Self> {
        let message_type = envelope.message_type.unwrap_or_default();
        match message_type.as_str() {
            GQL_CONNECTION_INIT => Ok(Self::ConnectionInit {
                id: envelope.id,
                payload: envelope.payload,
            }),
            GQL_START => {
                let id = envelope
                    .id
                    .ok_or_else(|| ProtocolError::MissingOperationId(message_type.clone()))?;
                let payload = parse_start_payload(envelope.payload)?;
                Ok(Self::Start { id, payload })
            }
            GQL_STOP => {
                let id = envelope
                    .id
                    .ok_or_else(|| ProtocolError::MissingOperationId(message_type.clone()))?;
                Ok(Self::Stop { id })
            }
            GQL_CONNECTION_TERMINATE => Ok(Self::ConnectionTerminate),
            _ => Err(ProtocolError::UnknownMessageType(message_type)),
        }
    }

    /// Wire type tag of this message
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::ConnectionInit { .. } => GQL_CONNECTION_INIT,
            Self::Start { .. } => GQL_START,
            Self::Stop { .. } => GQL_STOP,
            Self::ConnectionTerminate => GQL_CONNECTION_TERMINATE,
        }
    }
}

fn parse_start_payload(payload: Option<Value>) -> ProtocolResult<StartPayload> {
    match payload {
        Some(value @ Value::Object(_)) => serde_json::from_value(value)
            .map_err(|e| ProtocolError::InvalidPayload(e.to_string())),
        Some(_) => Err(ProtocolError::InvalidPayload(
            "payload must be an object".to_string(),
        )),
        None => Err(ProtocolError::InvalidPayload("missing payload".to_string())),
    }
}

/// Error payload sent with `error` and `connection_error`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn into_value(self) -> ResultValue {
        ResultValue::object([("message", ResultValue::String(self.message))])
    }
}

/// Message sent by the server
#[derive(Debug, Clone)]
pub enum ServerMessage {
    ConnectionAck,
    ConnectionError {
        id: Option<String>,
        payload: ErrorPayload,
    },
    Data {
        id: String,
        payload: ResultValue,
    },
    Error {
        id: Option<String>,
        payload: ErrorPayload,
    },
    Complete {
        id: String,
    },
    KeepAlive,
}

impl ServerMessage {
    /// Wire type tag of this message
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::ConnectionAck => GQL_CONNECTION_ACK,
            Self::ConnectionError { .. } => GQL_CONNECTION_ERROR,
            Self::Data { .. } => GQL_DATA,
            Self::Error { .. } => GQL_ERROR,
            Self::Complete { .. } => GQL_COMPLETE,
            Self::KeepAlive => GQL_CONNECTION_KEEP_ALIVE,
        }
    }

    /// Operation id the message is scoped to
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::ConnectionError { id, .. } | Self::Error { id, .. } => id.as_deref(),
            Self::Data { id, .. } | Self::Complete { id } => Some(id),
            Self::ConnectionAck | Self::KeepAlive => None,
        }
    }

    /// Build the envelope tree; absent fields are omitted
    pub fn into_envelope(self) -> ResultValue {
        let message_type = self.message_type();
        let (id, payload) = match self {
            Self::ConnectionAck | Self::KeepAlive => (None, None),
            Self::ConnectionError { id, payload } | Self::Error { id, payload } => {
                (id, Some(payload.into_value()))
            }
            Self::Data { id, payload } => (Some(id), Some(payload)),
            Self::Complete { id } => (Some(id), None),
        };

        let mut fields = Vec::with_capacity(3);
        if let Some(id) = id {
            fields.push(("id".to_string(), ResultValue::String(id)));
        }
        fields.push(("type".to_string(), ResultValue::from(message_type)));
        if let Some(payload) = payload {
            fields.push(("payload".to_string(), payload));
        }
        ResultValue::Object(fields)
    }
}
