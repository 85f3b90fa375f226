//! TCP listener and accept loop
//!
//! The only recovery point in the crate: temporary accept failures are
//! retried with exponential backoff; everything past `accept` is owned by
//! a per-connection task and dies with its connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::SessionHandler;

const ACCEPT_BACKOFF_INITIAL: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// RTMP ingest server: accept loop plus one task per connection
pub struct IngestServer<H> {
    config: ServerConfig,
    handler: Arc<H>,
    next_session_id: AtomicU64,
}

impl<H: SessionHandler> IngestServer<H> {
    pub fn new(config: ServerConfig, handler: H) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Bind and serve until the token is cancelled.
    ///
    /// Cancellation stops the accept loop and propagates to every
    /// connection task through child tokens.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "RTMP server listening");

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
            result = self.accept_loop(&listener, &cancel) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener, cancel: &CancellationToken) -> Result<()> {
        let mut backoff = ACCEPT_BACKOFF_INITIAL;

        loop {
            let (socket, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Transient conditions (EMFILE, ECONNABORTED, ...)
                    // resolve themselves; retry instead of tearing the
                    // server down.
                    tracing::error!(error = %e, backoff_ms = backoff.as_millis() as u64, "accept failed");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                    continue;
                }
            };
            backoff = ACCEPT_BACKOFF_INITIAL;

            if let Err(e) = self.configure_socket(&socket) {
                tracing::warn!(peer = %peer_addr, error = %e, "socket configuration failed");
            }

            let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session_id, peer = %peer_addr, "accepted");

            let config = self.config.clone();
            let handler = Arc::clone(&self.handler);
            let child_cancel = cancel.child_token();

            tokio::spawn(async move {
                let mut connection =
                    Connection::new(session_id, socket, peer_addr, config, handler, child_cancel);

                match connection.run().await {
                    Ok(()) => tracing::debug!(session_id, "connection closed"),
                    Err(e) if e.is_failure() => {
                        tracing::warn!(session_id, error = %e, "connection failed")
                    }
                    Err(e) => tracing::debug!(session_id, reason = %e, "connection ended"),
                }
            });
        }
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        if let Some(period) = self.config.tcp_keepalive {
            let keepalive = TcpKeepalive::new().with_time(period);
            SockRef::from(socket).set_tcp_keepalive(&keepalive)?;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> std::net::SocketAddr {
        self.config.bind_addr
    }
}
