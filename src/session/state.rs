//! Connection-scoped protocol state

use crate::protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_WINDOW_ACK_SIZE};

/// Mutable protocol state for one connection.
///
/// Tracks the negotiated parameters announced by the peer and the byte
/// accounting behind Acknowledgement messages.
#[derive(Debug)]
pub struct SessionState {
    /// Inbound chunk size announced by the peer
    pub in_chunk_size: u32,

    /// Window size the peer asked us to acknowledge against
    pub window_ack_size: u32,

    /// Peer bandwidth limit announced by the peer, if any
    pub peer_bandwidth: Option<(u32, u8)>,

    /// Total payload bytes received on this connection
    pub bytes_received: u64,

    /// `bytes_received` value at the last Acknowledgement we sent
    last_acked: u64,

    /// Whether a connect command has been accepted
    pub connected: bool,

    /// Next message stream id handed out by createStream
    next_stream_id: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            in_chunk_size: DEFAULT_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: None,
            bytes_received: 0,
            last_acked: 0,
            connected: false,
            next_stream_id: 1,
        }
    }

    pub fn add_bytes_received(&mut self, n: u64) {
        self.bytes_received += n;
    }

    /// Whether unacknowledged bytes have reached the peer's window
    pub fn ack_due(&self) -> bool {
        self.window_ack_size > 0
            && self.bytes_received - self.last_acked >= u64::from(self.window_ack_size)
    }

    pub fn mark_ack_sent(&mut self) {
        self.last_acked = self.bytes_received;
    }

    /// Hand out a message stream id for createStream
    pub fn allocate_stream_id(&mut self) -> u32 {
        let id = self.next_stream_id;
        self.next_stream_id += 1;
        id
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_accounting() {
        let mut state = SessionState::new();
        state.window_ack_size = 1000;

        state.add_bytes_received(400);
        assert!(!state.ack_due());
        state.add_bytes_received(400);
        assert!(!state.ack_due());
        state.add_bytes_received(400);
        assert!(state.ack_due());
        state.mark_ack_sent();

        state.add_bytes_received(999);
        assert!(!state.ack_due());
        state.add_bytes_received(1);
        assert!(state.ack_due());
    }

    #[test]
    fn test_stream_id_allocation() {
        let mut state = SessionState::new();
        assert_eq!(state.allocate_stream_id(), 1);
        assert_eq!(state.allocate_stream_id(), 2);
        assert_eq!(state.allocate_stream_id(), 3);
    }
}
