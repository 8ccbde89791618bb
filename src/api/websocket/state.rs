//! WebSocket application state

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::server::SubscriptionServer;

/// Shared application state for WebSocket connections
pub struct AppState {
    /// Protocol engine shared by all connections
    pub server: SubscriptionServer,

    /// Number of sockets currently open
    connections: AtomicUsize,
}

impl AppState {
    pub fn new(server: SubscriptionServer) -> Self {
        Self {
            server,
            connections: AtomicUsize::new(0),
        }
    }

    /// Get the number of open connections
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Count a connection for as long as the returned guard lives
    pub fn track_connection(&self) -> ConnectionGuard<'_> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard { state: self }
    }
}

/// Decrements the live connection count on drop
pub struct ConnectionGuard<'a> {
    state: &'a AppState,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.state.connections.fetch_sub(1, Ordering::SeqCst);
    }
}
