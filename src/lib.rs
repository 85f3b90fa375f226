//! rtmp-ingest: server-side RTMP core
//!
//! Implements the control plane of the Real-Time Messaging Protocol over
//! TCP: the plaintext handshake, the chunk stream demultiplexer and
//! multiplexer, the AMF0 command codec, and the minimal replies that bring
//! a `NetConnection` to `Connect.Success` and accept createStream/publish.
//! Media payloads are passed through to the application opaque and intact.
//!
//! # Example
//!
//! ```no_run
//! use rtmp_ingest::{IngestServer, ServerConfig, SessionHandler};
//! use rtmp_ingest::protocol::Message;
//! use rtmp_ingest::session::SessionContext;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Recorder;
//!
//! #[async_trait::async_trait]
//! impl SessionHandler for Recorder {
//!     async fn on_message(&self, ctx: &SessionContext, message: &Message) {
//!         println!(
//!             "session {}: type {} ({} bytes)",
//!             ctx.session_id,
//!             message.type_id,
//!             message.payload.len()
//!         );
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = IngestServer::new(ServerConfig::default(), Recorder);
//!     server.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;

pub use amf::Amf0Value;
pub use error::{Error, Result};
pub use protocol::{ChunkDecoder, ChunkEncoder, Message};
pub use server::{IngestServer, LoggingHandler, ServerConfig, SessionHandler};
