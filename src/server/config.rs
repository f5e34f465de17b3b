//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Default pause between two frames sent to one viewer
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Path the stream is served on (None = any path). A missing leading
    /// `/` is added.
    pub path: Option<String>,

    /// Wait before pulling each frame for a connection
    pub frame_interval: Duration,

    /// Maximum concurrent viewers (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            path: None,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            max_connections: 0,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Only serve the stream on `path`
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the per-connection frame pacing interval
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Route the stream is mounted on, if restricted to one path
    pub(crate) fn route_path(&self) -> Option<String> {
        self.path.as_ref().map(|path| {
            if path.starts_with('/') {
                path.clone()
            } else {
                format!("/{}", path)
            }
        })
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}
