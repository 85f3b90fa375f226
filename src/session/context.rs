//! Context handed to application handlers

use std::net::SocketAddr;

/// Identity of one connection, passed to every handler callback
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Server-assigned session id, unique per process
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Application name from the connect command, once received
    pub app: Option<String>,
}

impl SessionContext {
    pub fn new(session_id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            session_id,
            peer_addr,
            app: None,
        }
    }
}
