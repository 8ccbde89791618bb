//! GraphQL WS Server
//!
//! A connection-scoped GraphQL subscription server speaking the `graphql-ws`
//! websocket subprotocol (subscriptions-transport-ws).
//!
//! # Features
//!
//! - **Operation lifecycle**: `start`/`stop` with per-connection id registry
//! - **Deferred values**: results may hold futures; the encoder waits for them
//! - **Clean teardown**: closing a socket disposes every live operation once
//! - **JWT connect hook**: optional token check on `connection_init`
//! - **Keep-alive**: periodic `ka` frames after the ack
//!
//! # Modules
//!
//! - `protocol`: wire messages and the deferred-aware encoder
//! - `execution`: the `Executor` trait the server delegates to
//! - `connection`: per-socket context and operation registry
//! - `server`: the protocol engine
//! - `auth`: JWT validation for `connection_init`
//! - `api`: axum router and websocket adapter
//! - `config`: environment configuration
//! - `demo`: example executor used by the binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use graphql_ws_server::api::{create_router, websocket::AppState};
//! use graphql_ws_server::demo::DemoExecutor;
//! use graphql_ws_server::SubscriptionServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = SubscriptionServer::new(Arc::new(DemoExecutor::new()));
//!     let app = create_router(Arc::new(AppState::new(server)), "/subscriptions");
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod connection;
pub mod demo;
pub mod error;
pub mod execution;
pub mod protocol;
pub mod server;

// Re-export commonly used items at crate root
pub use auth::JwtAuth;
pub use config::ServerConfig;
pub use connection::{ConnectionContext, RequestContext, Transport};
pub use error::{ConnectError, ExecutionError, ProtocolError, ProtocolResult, TransportError};
pub use execution::{ExecutionParams, ExecutionResult, Executor, Response};
pub use protocol::{ClientMessage, ResultValue, ServerMessage};
pub use server::{AcceptAll, ConnectionHooks, ProtocolOptions, SubscriptionServer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
