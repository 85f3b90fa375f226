//! Per-connection driver
//!
//! Owns one accepted byte stream end to end: handshake, chunk
//! demultiplexing, acknowledgement accounting, control handling, command
//! dispatch, and delivery of completed messages to the application
//! handler. All outbound traffic is serialized through the single writer
//! this task owns, one whole message at a time, so chunks are never
//! interleaved mid-write.
//!
//! Errors are fatal: nothing at this layer retries. The task returns, the
//! socket drops, and the handler sees `on_disconnect`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::amf::Amf0Value;
use crate::error::{Error, Result};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, Message};
use crate::protocol::constants::*;
use crate::protocol::handshake::ServerHandshake;
use crate::protocol::message::{Command, ControlMessage, UserControlEvent};
use crate::server::config::ServerConfig;
use crate::server::handler::SessionHandler;
use crate::session::{SessionContext, SessionState};

const READ_BUF_SIZE: usize = 16 * 1024;

/// Driver for one accepted connection.
///
/// Generic over the byte stream so tests can run it over an in-memory
/// duplex pipe; the listener hands it a `TcpStream`.
pub struct Connection<S, H> {
    context: SessionContext,
    state: SessionState,
    reader: BufReader<tokio::io::ReadHalf<S>>,
    writer: BufWriter<tokio::io::WriteHalf<S>>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
    config: ServerConfig,
    handler: Arc<H>,
    cancel: CancellationToken,
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Send,
    H: SessionHandler,
{
    pub fn new(
        session_id: u64,
        stream: S,
        peer_addr: SocketAddr,
        config: ServerConfig,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            context: SessionContext::new(session_id, peer_addr),
            state: SessionState::new(),
            reader: BufReader::with_capacity(READ_BUF_SIZE, read_half),
            writer: BufWriter::with_capacity(READ_BUF_SIZE, write_half),
            read_buf: BytesMut::with_capacity(READ_BUF_SIZE),
            write_buf: BytesMut::with_capacity(READ_BUF_SIZE),
            decoder: ChunkDecoder::with_max_message_size(config.max_message_size),
            encoder: ChunkEncoder::new(),
            config,
            handler,
            cancel,
        }
    }

    /// Run the connection to completion
    pub async fn run(&mut self) -> Result<()> {
        if !self.handler.on_connection(&self.context).await {
            tracing::debug!(session_id = self.context.session_id, "connection refused");
            return Ok(());
        }

        let result = self.serve().await;

        self.handler.on_disconnect(&self.context).await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        self.handshake().await?;
        tracing::debug!(session_id = self.context.session_id, "handshake complete");

        // Announce a non-default chunk size before any larger chunk goes out
        if self.config.chunk_size != DEFAULT_CHUNK_SIZE {
            self.send_control(&ControlMessage::SetChunkSize(self.config.chunk_size))
                .await?;
            self.encoder.set_chunk_size(self.config.chunk_size);
        }

        loop {
            let n = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                read = with_deadline(
                    self.config.read_timeout,
                    self.reader.read_buf(&mut self.read_buf),
                ) => read?,
            };
            if n == 0 {
                return Ok(());
            }

            self.state.add_bytes_received(n as u64);

            while let Some((csid, message)) = self.decoder.decode(&mut self.read_buf)? {
                self.handle_message(csid, message).await?;
            }

            // checked after processing so a window announced mid-read
            // still gets acknowledged
            if self.state.ack_due() {
                self.send_acknowledgement().await?;
            }
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        let handshake = ServerHandshake::new(self.config.handshake_echo_c1);
        let deadline = self.config.read_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = async {
                match deadline {
                    Some(limit) => timeout(limit, handshake.perform(&mut self.reader, &mut self.writer))
                        .await
                        .map_err(|_| Error::Timeout)?,
                    None => handshake.perform(&mut self.reader, &mut self.writer).await,
                }
            } => result,
        }
    }

    async fn handle_message(&mut self, _csid: u32, message: Message) -> Result<()> {
        match ControlMessage::parse(&message)? {
            Some(ControlMessage::SetChunkSize(size)) => {
                tracing::debug!(session_id = self.context.session_id, size, "peer set chunk size");
                self.decoder.set_chunk_size(size)?;
                self.state.in_chunk_size = size;
            }
            Some(ControlMessage::Abort { csid }) => {
                self.decoder.abort(csid);
            }
            Some(ControlMessage::Acknowledgement { sequence }) => {
                tracing::trace!(session_id = self.context.session_id, sequence, "peer ack");
            }
            Some(ControlMessage::WindowAckSize(size)) => {
                self.state.window_ack_size = size;
            }
            Some(ControlMessage::SetPeerBandwidth { size, limit_type }) => {
                self.state.peer_bandwidth = Some((size, limit_type));
            }
            Some(ControlMessage::UserControl(event)) => {
                self.handle_user_control(event).await?;
            }
            Some(ControlMessage::Command(cmd)) => {
                self.handle_command(&cmd, &message).await?;
                // commands are application-layer messages too
                self.handler.on_message(&self.context, &message).await;
            }
            None => {
                self.handler.on_message(&self.context, &message).await;
            }
        }
        Ok(())
    }

    async fn handle_user_control(&mut self, event: UserControlEvent) -> Result<()> {
        match event {
            UserControlEvent::PingRequest(ts) => {
                self.send_control(&ControlMessage::UserControl(UserControlEvent::PingResponse(
                    ts,
                )))
                .await?;
            }
            other => {
                tracing::trace!(session_id = self.context.session_id, event = ?other, "user control");
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, cmd: &Command, message: &Message) -> Result<()> {
        match cmd.name.as_str() {
            CMD_CONNECT => self.handle_connect(cmd).await,
            CMD_CREATE_STREAM => self.handle_create_stream(cmd).await,
            CMD_RELEASE_STREAM | CMD_FC_PUBLISH | CMD_FC_UNPUBLISH => {
                // acknowledged with a bare result echoing the transaction id
                let reply = Command::result(cmd.transaction_id, vec![Amf0Value::Null]);
                self.send_command(&reply, 0).await
            }
            CMD_PUBLISH => self.handle_publish(cmd, message).await,
            CMD_DELETE_STREAM | CMD_CLOSE_STREAM => {
                tracing::debug!(
                    session_id = self.context.session_id,
                    command = %cmd.name,
                    "stream released"
                );
                Ok(())
            }
            other => {
                tracing::trace!(session_id = self.context.session_id, command = other, "unknown command");
                Ok(())
            }
        }
    }

    /// connect: control-plane preamble, then the success result.
    ///
    /// Window Ack Size, Set Peer Bandwidth and Stream Begin go out
    /// immediately before the first `_result`.
    async fn handle_connect(&mut self, cmd: &Command) -> Result<()> {
        let app = cmd
            .values
            .first()
            .and_then(|v| v.get_str("app"))
            .unwrap_or_default()
            .to_string();

        if !self.handler.on_connect(&self.context, &app).await {
            tracing::debug!(session_id = self.context.session_id, app = %app, "connect rejected");
            let reply = Command {
                name: CMD_ERROR.to_string(),
                transaction_id: cmd.transaction_id,
                values: vec![
                    Amf0Value::Null,
                    status_object("error", NC_CONNECT_REJECTED, "connection rejected"),
                ],
            };
            self.send_command(&reply, 0).await?;
            return Err(Error::ConnectionClosed);
        }

        self.context.app = Some(app.clone());
        self.state.connected = true;

        self.send_control(&ControlMessage::WindowAckSize(self.config.window_ack_size))
            .await?;
        self.send_control(&ControlMessage::SetPeerBandwidth {
            size: self.config.peer_bandwidth,
            limit_type: BANDWIDTH_LIMIT_DYNAMIC,
        })
        .await?;
        self.send_control(&ControlMessage::UserControl(UserControlEvent::StreamBegin(0)))
            .await?;

        let reply = Command::result(
            cmd.transaction_id,
            vec![
                Amf0Value::Object(vec![
                    ("fmsVer".to_string(), Amf0Value::String("FMS/3,5,7,7009".to_string())),
                    ("capabilities".to_string(), Amf0Value::Number(31.0)),
                ]),
                Amf0Value::Object(vec![
                    ("level".to_string(), Amf0Value::String("status".to_string())),
                    ("code".to_string(), Amf0Value::String(NC_CONNECT_SUCCESS.to_string())),
                    (
                        "description".to_string(),
                        Amf0Value::String("Connection succeeded.".to_string()),
                    ),
                    ("objectEncoding".to_string(), Amf0Value::Number(0.0)),
                ]),
            ],
        );
        self.send_command(&reply, 0).await?;

        tracing::info!(
            session_id = self.context.session_id,
            app = self.context.app.as_deref().unwrap_or_default(),
            "connected"
        );
        Ok(())
    }

    async fn handle_create_stream(&mut self, cmd: &Command) -> Result<()> {
        let stream_id = self.state.allocate_stream_id();
        let reply = Command::result(
            cmd.transaction_id,
            vec![Amf0Value::Null, Amf0Value::Number(f64::from(stream_id))],
        );
        self.send_command(&reply, 0).await?;
        tracing::debug!(session_id = self.context.session_id, stream_id, "stream created");
        Ok(())
    }

    async fn handle_publish(&mut self, cmd: &Command, message: &Message) -> Result<()> {
        // values: [command object (null), stream key, publish type]
        let stream_key = cmd
            .values
            .get(1)
            .and_then(Amf0Value::as_str)
            .unwrap_or_default()
            .to_string();

        self.send_control(&ControlMessage::UserControl(UserControlEvent::StreamBegin(
            message.stream_id,
        )))
        .await?;

        let status = Command::on_status(
            "status",
            NS_PUBLISH_START,
            &format!("{stream_key} is now published."),
        );
        self.send_command(&status, message.stream_id).await?;

        tracing::info!(
            session_id = self.context.session_id,
            stream_key = %stream_key,
            stream_id = message.stream_id,
            "publishing"
        );
        Ok(())
    }

    // === outbound helpers ===

    /// Protocol control messages use chunk stream 2 and message stream 0
    async fn send_control(&mut self, control: &ControlMessage) -> Result<()> {
        let (type_id, payload) = control.encode()?;
        self.write_message(
            CSID_PROTOCOL_CONTROL,
            Message {
                stream_id: 0,
                type_id,
                timestamp: 0,
                payload,
            },
        )
        .await
    }

    async fn send_command(&mut self, cmd: &Command, stream_id: u32) -> Result<()> {
        let payload = cmd.to_payload()?;
        self.write_message(
            CSID_COMMAND,
            Message {
                stream_id,
                type_id: MSG_COMMAND_AMF0,
                timestamp: 0,
                payload,
            },
        )
        .await
    }

    async fn send_acknowledgement(&mut self) -> Result<()> {
        let sequence = self.state.bytes_received as u32;
        self.send_control(&ControlMessage::Acknowledgement { sequence })
            .await?;
        self.state.mark_ack_sent();
        Ok(())
    }

    async fn write_message(&mut self, csid: u32, message: Message) -> Result<()> {
        self.write_buf.clear();
        self.encoder.encode(csid, &message, &mut self.write_buf)?;
        with_deadline(self.config.write_timeout, async {
            self.writer.write_all(&self.write_buf).await?;
            self.writer.flush().await
        })
        .await?;
        Ok(())
    }
}

/// Run an I/O future under an optional deadline; expiry is fatal
async fn with_deadline<F, T>(limit: Option<Duration>, io: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match limit {
        Some(limit) => match timeout(limit, io).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::Timeout),
        },
        None => Ok(io.await?),
    }
}

fn status_object(level: &str, code: &str, description: &str) -> Amf0Value {
    Amf0Value::Object(vec![
        ("level".to_string(), Amf0Value::String(level.to_string())),
        ("code".to_string(), Amf0Value::String(code.to_string())),
        (
            "description".to_string(),
            Amf0Value::String(description.to_string()),
        ),
    ])
}
