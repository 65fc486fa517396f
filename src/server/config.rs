//! Server configuration.

use std::net::SocketAddr;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The size of each socket read.
    pub read_buffer_size: usize,
    /// Upper bound on head plus body of a single request.
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1024,
            read_buffer_size: 8192,
            max_request_size: 1024 * 1024,
        }
    }
}
