//! graphql-ws endpoint over axum websockets
//!
//! Each accepted socket is split: the sink becomes the connection's
//! [`Transport`](crate::connection::Transport), the stream is read by
//! [`handler::handle_socket`] and fed to the protocol engine.

pub mod handler;
pub mod state;
pub mod transport;

pub use handler::ws_handler;
pub use state::AppState;
pub use transport::WsTransport;
