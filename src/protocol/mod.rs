//! RTMP wire protocol implementation
//!
//! This module handles the low-level protocol details:
//! - Handshake (C0/C1/C2 and S0/S1/S2 exchange)
//! - Chunk stream multiplexing and demultiplexing
//! - Control and command message framing

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder, Message};
pub use handshake::ServerHandshake;
pub use message::{ControlMessage, UserControlEvent};
