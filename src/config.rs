//! Server configuration from environment variables
//!
//! | Variable                  | Default           |
//! |---------------------------|-------------------|
//! | `GQL_WS_ADDR`             | `127.0.0.1:8000`  |
//! | `GQL_WS_PATH`             | `/subscriptions`  |
//! | `GQL_WS_KEEP_ALIVE_SECS`  | unset (disabled)  |
//! | `GQL_WS_OPEN_TIMEOUT_MS`  | `5000`            |
//! | `GQL_WS_JWT_SECRET`       | unset (no auth)   |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::server::ProtocolOptions;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_PATH: &str = "/subscriptions";
pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Route the websocket endpoint is mounted on
    pub path: String,
    pub keep_alive: Option<Duration>,
    pub open_timeout: Duration,
    pub jwt_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            path: DEFAULT_PATH.to_string(),
            keep_alive: None,
            open_timeout: Duration::from_millis(DEFAULT_OPEN_TIMEOUT_MS),
            jwt_secret: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, "GQL_WS_ADDR") {
            config.addr = addr;
        }

        if let Some(path) = lookup("GQL_WS_PATH").filter(|p| !p.trim().is_empty()) {
            let path = path.trim();
            config.path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            };
        }

        // 0 disables keep-alive
        config.keep_alive = parse_var::<u64, _>(&lookup, "GQL_WS_KEEP_ALIVE_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        if let Some(ms) = parse_var::<u64, _>(&lookup, "GQL_WS_OPEN_TIMEOUT_MS") {
            config.open_timeout = Duration::from_millis(ms);
        }

        config.jwt_secret = lookup("GQL_WS_JWT_SECRET").filter(|s| !s.is_empty());

        config
    }

    pub fn protocol_options(&self) -> ProtocolOptions {
        ProtocolOptions {
            keep_alive: self.keep_alive,
            open_timeout: self.open_timeout,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = key, value = %raw, "ignoring unparseable value");
            None
        }
    }
}
