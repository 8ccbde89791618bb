//! Protocol types for graphql-ws communication
//!
//! This module contains the wire envelope and the deferred-aware encoder.

pub mod codec;
mod message;

pub use codec::{encode, Deferred, EncodePass, Encoder, ResultValue};
pub use message::{
    ClientMessage, Envelope, ErrorPayload, RejectedMessage, ServerMessage, StartPayload,
    CLOSE_CODE_POLICY_VIOLATION, GQL_COMPLETE, GQL_CONNECTION_ACK, GQL_CONNECTION_ERROR,
    GQL_CONNECTION_INIT, GQL_CONNECTION_KEEP_ALIVE, GQL_CONNECTION_TERMINATE, GQL_DATA,
    GQL_ERROR, GQL_START, GQL_STOP, SUBPROTOCOL,
};
