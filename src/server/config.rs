//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Read deadline per network read. `None` blocks indefinitely;
    /// production deployments should set a finite value.
    pub read_timeout: Option<Duration>,

    /// Write deadline per network write
    pub write_timeout: Option<Duration>,

    /// Cap on reassembled inbound message size
    pub max_message_size: u32,

    /// Initial outbound chunk size announced to the peer
    pub chunk_size: u32,

    /// Window acknowledgement size announced on connect
    pub window_ack_size: u32,

    /// Peer bandwidth announced on connect
    pub peer_bandwidth: u32,

    /// Send S2 as a verbatim echo of C1 (the encoder-compatible choice)
    /// instead of the `(C1-ts, recv-ts, C1-random)` layout
    pub handshake_echo_c1: bool,

    /// Enable TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,

    /// TCP keep-alive period for accepted sockets, `None` to disable
    pub tcp_keepalive: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], RTMP_PORT)),
            read_timeout: None,
            write_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            handshake_echo_c1: true,
            tcp_nodelay: true,
            tcp_keepalive: Some(Duration::from_secs(3 * 60)),
        }
    }
}

impl ServerConfig {
    /// Create a config bound to the given address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn max_message_size(mut self, max: u32) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.min(MAX_CHUNK_SIZE);
        self
    }

    pub fn handshake_echo_c1(mut self, echo: bool) -> Self {
        self.handshake_echo_c1 = echo;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 1935);
        assert_eq!(config.chunk_size, 128);
        assert_eq!(config.max_message_size, 16 * 1024 * 1024);
        assert_eq!(config.read_timeout, None);
        assert!(config.handshake_echo_c1);
        assert_eq!(config.tcp_keepalive, Some(Duration::from_secs(180)));
    }

    #[test]
    fn test_chunk_size_clamped() {
        let config = ServerConfig::default().chunk_size(0x0200_0000);
        assert_eq!(config.chunk_size, MAX_CHUNK_SIZE);
    }
}
