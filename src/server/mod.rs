//! RTMP server implementation
//!
//! - TCP listener and accept loop
//! - Per-connection driver (handshake, chunk loop, command dispatch)
//! - Handler trait for application callbacks

pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use handler::{LoggingHandler, SessionHandler};
pub use listener::IngestServer;
