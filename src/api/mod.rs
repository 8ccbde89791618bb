//! HTTP surface of the server
//!
//! A websocket route speaking graphql-ws plus a health check.

pub mod http;
pub mod websocket;

pub use http::create_router;
