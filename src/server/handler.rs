//! Application handler trait
//!
//! The core's single extension point. Completed application-layer
//! messages are delivered one at a time in the order their final chunks
//! arrive; the handler returns nothing and propagates failures
//! out-of-band (the core never retries on its behalf).

use async_trait::async_trait;

use crate::protocol::chunk::Message;
use crate::session::SessionContext;

/// Handler for connection lifecycle and completed messages.
///
/// All methods have accept-everything defaults.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Called when a connection is accepted, before the handshake.
    /// Return false to close it immediately.
    async fn on_connection(&self, _ctx: &SessionContext) -> bool {
        true
    }

    /// Called on the RTMP `connect` command with the application name.
    /// Return false to reject the connection.
    async fn on_connect(&self, _ctx: &SessionContext, _app: &str) -> bool {
        true
    }

    /// Called once per completed application-layer message: audio, video,
    /// data, and commands (after the core has sent its own replies). The
    /// payload is opaque to the core.
    async fn on_message(&self, _ctx: &SessionContext, _message: &Message) {}

    /// Called when the connection closes, for any reason
    async fn on_disconnect(&self, _ctx: &SessionContext) {}
}

/// Accepts everything and logs lifecycle events
pub struct LoggingHandler;

#[async_trait]
impl SessionHandler for LoggingHandler {
    async fn on_connection(&self, ctx: &SessionContext) -> bool {
        tracing::info!(
            session_id = ctx.session_id,
            peer = %ctx.peer_addr,
            "new connection"
        );
        true
    }

    async fn on_connect(&self, ctx: &SessionContext, app: &str) -> bool {
        tracing::info!(session_id = ctx.session_id, app = app, "connect");
        true
    }

    async fn on_message(&self, ctx: &SessionContext, message: &Message) {
        tracing::trace!(
            session_id = ctx.session_id,
            stream_id = message.stream_id,
            type_id = message.type_id,
            timestamp = message.timestamp,
            len = message.payload.len(),
            "message"
        );
    }

    async fn on_disconnect(&self, ctx: &SessionContext) {
        tracing::info!(session_id = ctx.session_id, "connection closed");
    }
}
