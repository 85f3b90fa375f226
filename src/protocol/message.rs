//! RTMP control and command message layer
//!
//! Completed messages fall into three groups:
//! - Protocol control messages (types 1-6): chunk and flow control, always
//!   on chunk stream 2 with message stream id 0
//! - AMF0 command messages (type 20): connect, createStream, publish, ...
//! - Everything else (audio, video, data, ...): opaque to the core and
//!   passed through to the application handler

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{self, Amf0Value};
use crate::error::{ProtocolError, Result};
use crate::protocol::chunk::Message;
use crate::protocol::constants::*;

/// A decoded control-plane message
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Set Chunk Size (type 1)
    SetChunkSize(u32),

    /// Abort Message (type 2)
    Abort { csid: u32 },

    /// Acknowledgement (type 3)
    Acknowledgement { sequence: u32 },

    /// User Control Message (type 4)
    UserControl(UserControlEvent),

    /// Window Acknowledgement Size (type 5)
    WindowAckSize(u32),

    /// Set Peer Bandwidth (type 6)
    SetPeerBandwidth { size: u32, limit_type: u8 },

    /// AMF0 Command (type 20)
    Command(Command),
}

/// User Control event (message type 4)
#[derive(Debug, Clone, PartialEq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    StreamIsRecorded(u32),
    PingRequest(u32),
    PingResponse(u32),
    Unknown { event_type: u16, data: Bytes },
}

/// An AMF0 command: element 0 is the name, element 1 the transaction id,
/// the rest travels as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub values: Vec<Amf0Value>,
}

impl ControlMessage {
    /// Parse a completed message the core itself acts on.
    ///
    /// Returns `Ok(None)` for message types the core treats as opaque
    /// (audio, video, data, anything unrecognized).
    pub fn parse(message: &Message) -> Result<Option<ControlMessage>> {
        let mut payload = message.payload.clone();

        let parsed = match message.type_id {
            MSG_SET_CHUNK_SIZE => {
                // high bit of the 4-byte payload is reserved zero
                ControlMessage::SetChunkSize(read_u32(&mut payload, message.type_id)? & 0x7FFF_FFFF)
            }
            MSG_ABORT => ControlMessage::Abort {
                csid: read_u32(&mut payload, message.type_id)?,
            },
            MSG_ACKNOWLEDGEMENT => ControlMessage::Acknowledgement {
                sequence: read_u32(&mut payload, message.type_id)?,
            },
            MSG_USER_CONTROL => ControlMessage::UserControl(parse_user_control(&mut payload)?),
            MSG_WINDOW_ACK_SIZE => {
                ControlMessage::WindowAckSize(read_u32(&mut payload, message.type_id)?)
            }
            MSG_SET_PEER_BANDWIDTH => {
                if payload.len() < 5 {
                    return Err(ProtocolError::TruncatedControl(message.type_id).into());
                }
                ControlMessage::SetPeerBandwidth {
                    size: payload.get_u32(),
                    limit_type: payload.get_u8(),
                }
            }
            MSG_COMMAND_AMF0 => ControlMessage::Command(parse_command(&payload)?),
            _ => return Ok(None),
        };

        Ok(Some(parsed))
    }

    /// Encode to `(message type id, payload)`
    pub fn encode(&self) -> Result<(u8, Bytes)> {
        let encoded = match self {
            ControlMessage::SetChunkSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                (MSG_SET_CHUNK_SIZE, buf.freeze())
            }
            ControlMessage::Abort { csid } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*csid);
                (MSG_ABORT, buf.freeze())
            }
            ControlMessage::Acknowledgement { sequence } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*sequence);
                (MSG_ACKNOWLEDGEMENT, buf.freeze())
            }
            ControlMessage::UserControl(event) => (MSG_USER_CONTROL, encode_user_control(event)),
            ControlMessage::WindowAckSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                (MSG_WINDOW_ACK_SIZE, buf.freeze())
            }
            ControlMessage::SetPeerBandwidth { size, limit_type } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u32(*size);
                buf.put_u8(*limit_type);
                (MSG_SET_PEER_BANDWIDTH, buf.freeze())
            }
            ControlMessage::Command(cmd) => (MSG_COMMAND_AMF0, cmd.to_payload()?),
        };
        Ok(encoded)
    }
}

fn read_u32(payload: &mut Bytes, type_id: u8) -> Result<u32> {
    if payload.len() < 4 {
        return Err(ProtocolError::TruncatedControl(type_id).into());
    }
    Ok(payload.get_u32())
}

fn parse_user_control(payload: &mut Bytes) -> Result<UserControlEvent> {
    if payload.len() < 6 {
        return Err(ProtocolError::TruncatedControl(MSG_USER_CONTROL).into());
    }

    let event_type = payload.get_u16();
    let event = match event_type {
        UC_STREAM_BEGIN => UserControlEvent::StreamBegin(payload.get_u32()),
        UC_STREAM_EOF => UserControlEvent::StreamEof(payload.get_u32()),
        UC_STREAM_DRY => UserControlEvent::StreamDry(payload.get_u32()),
        UC_SET_BUFFER_LENGTH => {
            if payload.len() < 8 {
                return Err(ProtocolError::TruncatedControl(MSG_USER_CONTROL).into());
            }
            UserControlEvent::SetBufferLength {
                stream_id: payload.get_u32(),
                buffer_ms: payload.get_u32(),
            }
        }
        UC_STREAM_IS_RECORDED => UserControlEvent::StreamIsRecorded(payload.get_u32()),
        UC_PING_REQUEST => UserControlEvent::PingRequest(payload.get_u32()),
        UC_PING_RESPONSE => UserControlEvent::PingResponse(payload.get_u32()),
        _ => UserControlEvent::Unknown {
            event_type,
            data: payload.clone(),
        },
    };

    Ok(event)
}

fn encode_user_control(event: &UserControlEvent) -> Bytes {
    let mut buf = BytesMut::with_capacity(10);
    match event {
        UserControlEvent::StreamBegin(id) => {
            buf.put_u16(UC_STREAM_BEGIN);
            buf.put_u32(*id);
        }
        UserControlEvent::StreamEof(id) => {
            buf.put_u16(UC_STREAM_EOF);
            buf.put_u32(*id);
        }
        UserControlEvent::StreamDry(id) => {
            buf.put_u16(UC_STREAM_DRY);
            buf.put_u32(*id);
        }
        UserControlEvent::SetBufferLength {
            stream_id,
            buffer_ms,
        } => {
            buf.put_u16(UC_SET_BUFFER_LENGTH);
            buf.put_u32(*stream_id);
            buf.put_u32(*buffer_ms);
        }
        UserControlEvent::StreamIsRecorded(id) => {
            buf.put_u16(UC_STREAM_IS_RECORDED);
            buf.put_u32(*id);
        }
        UserControlEvent::PingRequest(ts) => {
            buf.put_u16(UC_PING_REQUEST);
            buf.put_u32(*ts);
        }
        UserControlEvent::PingResponse(ts) => {
            buf.put_u16(UC_PING_RESPONSE);
            buf.put_u32(*ts);
        }
        UserControlEvent::Unknown { event_type, data } => {
            buf.put_u16(*event_type);
            buf.put_slice(data);
        }
    }
    buf.freeze()
}

fn parse_command(payload: &[u8]) -> Result<Command> {
    let mut values = amf::decode(payload)?.into_iter();

    let name = match values.next() {
        Some(Amf0Value::String(s)) => s,
        other => {
            return Err(
                ProtocolError::InvalidCommand(format!("expected command name, got {other:?}"))
                    .into(),
            )
        }
    };

    // Lenient on the transaction id: some encoders send null here
    let transaction_id = match values.next() {
        Some(Amf0Value::Number(n)) => n,
        _ => 0.0,
    };

    Ok(Command {
        name,
        transaction_id,
        values: values.collect(),
    })
}

impl Command {
    /// Serialize to an AMF0 command payload
    pub fn to_payload(&self) -> Result<Bytes> {
        let mut sequence = Vec::with_capacity(2 + self.values.len());
        sequence.push(Amf0Value::String(self.name.clone()));
        sequence.push(Amf0Value::Number(self.transaction_id));
        sequence.extend(self.values.iter().cloned());
        Ok(amf::encode(&sequence)?)
    }

    /// `_result` reply echoing a transaction id
    pub fn result(transaction_id: f64, values: Vec<Amf0Value>) -> Self {
        Command {
            name: CMD_RESULT.to_string(),
            transaction_id,
            values,
        }
    }

    /// `onStatus` notification with the conventional info object
    pub fn on_status(level: &str, code: &str, description: &str) -> Self {
        Command {
            name: CMD_ON_STATUS.to_string(),
            transaction_id: 0.0,
            values: vec![
                Amf0Value::Null,
                Amf0Value::Object(vec![
                    ("level".to_string(), Amf0Value::String(level.to_string())),
                    ("code".to_string(), Amf0Value::String(code.to_string())),
                    (
                        "description".to_string(),
                        Amf0Value::String(description.to_string()),
                    ),
                ]),
            ],
        }
    }
}
