//! RTMP protocol constants
//!
//! Reference: Adobe RTMP Specification (December 2012)

/// RTMP version number (always 3 for plaintext RTMP)
pub const RTMP_VERSION: u8 = 3;

/// Default RTMP port (the Macromedia Flash Communication Server port)
pub const RTMP_PORT: u16 = 1935;

/// C1/C2/S1/S2 handshake packet size
pub const HANDSHAKE_SIZE: usize = 1536;

/// Random block length inside a handshake packet (after ts + zeros)
pub const HANDSHAKE_RANDOM_SIZE: usize = 1528;

/// Default chunk size until a Set Chunk Size message changes it
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Largest representable chunk size (24-bit length fields)
pub const MAX_CHUNK_SIZE: u32 = 0xFFFFFF;

/// Default cap on reassembled message size (16 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// 24-bit timestamp field value that announces an extended timestamp
pub const EXTENDED_TIMESTAMP: u32 = 0xFFFFFF;

/// Largest chunk stream id the 3-byte basic header can carry
pub const MAX_CHUNK_STREAM_ID: u32 = 65599;

// Chunk stream ids. 0 and 1 are basic-header encoding markers and never
// carry messages.

/// Protocol control messages (types 1-6)
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// AMF0 command messages by convention
pub const CSID_COMMAND: u32 = 3;

// Message type ids

/// Set Chunk Size (protocol control)
pub const MSG_SET_CHUNK_SIZE: u8 = 1;

/// Abort Message (protocol control)
pub const MSG_ABORT: u8 = 2;

/// Acknowledgement (protocol control)
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;

/// User Control Message (protocol control)
pub const MSG_USER_CONTROL: u8 = 4;

/// Window Acknowledgement Size (protocol control)
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;

/// Set Peer Bandwidth (protocol control)
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;

/// Audio Message
pub const MSG_AUDIO: u8 = 8;

/// Video Message
pub const MSG_VIDEO: u8 = 9;

/// AMF0 Data Message (onMetaData and friends)
pub const MSG_DATA_AMF0: u8 = 18;

/// AMF0 Command Message (connect, createStream, publish, ...)
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event types

pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_STREAM_EOF: u16 = 1;
pub const UC_STREAM_DRY: u16 = 2;
pub const UC_SET_BUFFER_LENGTH: u16 = 3;
pub const UC_STREAM_IS_RECORDED: u16 = 4;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

// Set Peer Bandwidth limit types

pub const BANDWIDTH_LIMIT_HARD: u8 = 0;
pub const BANDWIDTH_LIMIT_SOFT: u8 = 1;
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;

// Command names

pub const CMD_CONNECT: &str = "connect";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_RELEASE_STREAM: &str = "releaseStream";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_CLOSE_STREAM: &str = "closeStream";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_FC_UNPUBLISH: &str = "FCUnpublish";

pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";
pub const CMD_ON_STATUS: &str = "onStatus";
pub const CMD_ON_FC_PUBLISH: &str = "onFCPublish";
pub const CMD_ON_FC_UNPUBLISH: &str = "onFCUnpublish";

// Status codes

pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const NC_CONNECT_REJECTED: &str = "NetConnection.Connect.Rejected";
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";

// Default server settings

/// Default window acknowledgement size (2.5 MB)
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;

/// Default peer bandwidth (2.5 MB)
pub const DEFAULT_PEER_BANDWIDTH: u32 = 2_500_000;
