//! RTMP chunk stream codec
//!
//! Messages are interleaved on the wire as chunks. Each chunk carries a
//! basic header (chunk stream id + header format), one of four message
//! header formats, an optional extended timestamp, and a payload fragment:
//!
//! ```text
//! +--------------+----------------------+--------------------+-----------+
//! | Basic Header | Message Header       | Extended Timestamp | Data      |
//! | (1-3 bytes)  | (0, 3, 7 or 11 bytes)| (0 or 4 bytes)     | (variable)|
//! +--------------+----------------------+--------------------+-----------+
//!
//! Format 0 (11 bytes): timestamp(3) length(3) type(1) stream id(4, LE)
//! Format 1 (7 bytes):  ts delta(3) length(3) type(1)
//! Format 2 (3 bytes):  ts delta(3)
//! Format 3 (0 bytes):  everything inherited
//! ```
//!
//! Formats 1-3 compress against the previous chunk on the same chunk
//! stream. A 3-byte timestamp field holding 0xFFFFFF announces a 4-byte
//! extended timestamp after the message header.
//!
//! The message stream id in a format 0 header is the only little-endian
//! field in the protocol; encode and decode of it both live here.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result, UsageError};
use crate::protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_SIZE, EXTENDED_TIMESTAMP, MAX_CHUNK_SIZE,
    MAX_CHUNK_STREAM_ID,
};

/// A complete RTMP message, reassembled from one or more chunks
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message stream id
    pub stream_id: u32,
    /// Message type id
    pub type_id: u8,
    /// Absolute timestamp in milliseconds
    pub timestamp: u32,
    /// Opaque payload of the declared length
    pub payload: Bytes,
}

/// Header state carried from the previous chunk on a chunk stream.
///
/// Compressed header formats are only legal once a format 0 chunk has
/// asserted full state, which the type system encodes directly: a format
/// 1/2/3 chunk on an `Uninitialized` stream is a single match arm away
/// from a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriorHeader {
    /// No chunk seen yet on this chunk stream
    Uninitialized,
    /// A format 0 chunk asserted full state. The implied delta for a
    /// following format 3 chunk is the asserted timestamp itself.
    HaveFull {
        stream_id: u32,
        length: u32,
        type_id: u8,
        timestamp: u32,
        extended: bool,
    },
    /// A format 1/2/3 chunk established an explicit delta
    HaveDelta {
        stream_id: u32,
        length: u32,
        type_id: u8,
        timestamp: u32,
        delta: u32,
        extended: bool,
    },
}

impl PriorHeader {
    fn fields(&self) -> Option<(u32, u32, u8, u32)> {
        match *self {
            PriorHeader::Uninitialized => None,
            PriorHeader::HaveFull {
                stream_id,
                length,
                type_id,
                timestamp,
                ..
            }
            | PriorHeader::HaveDelta {
                stream_id,
                length,
                type_id,
                timestamp,
                ..
            } => Some((stream_id, length, type_id, timestamp)),
        }
    }

    /// Delta implied for a format 3 chunk that opens a new message
    fn implied_delta(&self) -> u32 {
        match *self {
            PriorHeader::Uninitialized => 0,
            PriorHeader::HaveFull { timestamp, .. } => timestamp,
            PriorHeader::HaveDelta { delta, .. } => delta,
        }
    }

    fn extended(&self) -> bool {
        match *self {
            PriorHeader::Uninitialized => false,
            PriorHeader::HaveFull { extended, .. } | PriorHeader::HaveDelta { extended, .. } => {
                extended
            }
        }
    }
}

/// Advance an absolute timestamp by a delta.
///
/// The 3-byte field rolls over at 2^24; once extended timestamps are in
/// play the full 32 bits are preserved.
fn advance_timestamp(prior: u32, delta: u32) -> u32 {
    if prior <= EXTENDED_TIMESTAMP && delta < EXTENDED_TIMESTAMP {
        (prior + delta) % (EXTENDED_TIMESTAMP + 1)
    } else {
        prior.wrapping_add(delta)
    }
}

/// Parse a basic header without consuming. Returns `(fmt, csid, length)`,
/// or `None` if the buffer does not yet hold the whole header.
fn peek_basic_header(buf: &[u8]) -> Option<(u8, u32, usize)> {
    let first = *buf.first()?;
    let fmt = first >> 6;
    match first & 0x3F {
        0 => {
            // 2-byte form: id = second byte + 64
            let second = *buf.get(1)?;
            Some((fmt, second as u32 + 64, 2))
        }
        1 => {
            // 3-byte form: id = third byte * 256 + second byte + 64
            let second = *buf.get(1)?;
            let third = *buf.get(2)?;
            Some((fmt, (third as u32) * 256 + second as u32 + 64, 3))
        }
        n => Some((fmt, n as u32, 1)),
    }
}

/// Write a basic header, choosing the minimum-length encoding for the id
fn write_basic_header(fmt: u8, csid: u32, buf: &mut BytesMut) -> Result<()> {
    if !(2..=MAX_CHUNK_STREAM_ID).contains(&csid) {
        return Err(UsageError::ChunkStreamIdOutOfRange(csid).into());
    }

    if csid < 64 {
        buf.put_u8(fmt << 6 | csid as u8);
    } else if csid < 320 {
        buf.put_u8(fmt << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        buf.put_u8(fmt << 6 | 1);
        buf.put_u8(((csid - 64) & 0xFF) as u8);
        buf.put_u8(((csid - 64) >> 8) as u8);
    }
    Ok(())
}

fn put_u24(value: u32, buf: &mut BytesMut) {
    buf.put_u8((value >> 16) as u8);
    buf.put_u8((value >> 8) as u8);
    buf.put_u8(value as u8);
}

fn peek_u24(buf: &[u8], at: usize) -> u32 {
    ((buf[at] as u32) << 16) | ((buf[at + 1] as u32) << 8) | buf[at + 2] as u32
}

#[derive(Debug, Default)]
struct Reassembly {
    /// Payload fragments accumulated so far
    partial: BytesMut,
    /// Declared length of the message under reassembly; 0 when idle
    expected: u32,
    /// Timestamp fixed by the first chunk of the message
    timestamp: u32,
    in_progress: bool,
}

/// Chunk stream decoder: demultiplexes interleaved chunks back into
/// messages, keeping per-chunk-stream prior-header and reassembly state.
#[derive(Debug)]
pub struct ChunkDecoder {
    chunk_size: u32,
    max_message_size: u32,
    prior: HashMap<u32, PriorHeader>,
    assembly: HashMap<u32, Reassembly>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max: u32) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_message_size: max,
            prior: HashMap::new(),
            assembly: HashMap::new(),
        }
    }

    /// Apply a peer Set Chunk Size. Takes effect for subsequent chunks.
    pub fn set_chunk_size(&mut self, size: u32) -> Result<()> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ProtocolError::ChunkSizeOutOfRange(size).into());
        }
        self.chunk_size = size;
        Ok(())
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Drop the partial message on a chunk stream (Abort message)
    pub fn abort(&mut self, csid: u32) {
        if let Some(assembly) = self.assembly.get_mut(&csid) {
            assembly.partial.clear();
            assembly.expected = 0;
            assembly.in_progress = false;
        }
    }

    /// Decode one chunk from the front of `buf`.
    ///
    /// Returns `Ok(Some((csid, message)))` when the chunk completed a
    /// message, `Ok(None)` when the buffer does not yet hold a full chunk
    /// (nothing is consumed in that case), and `Err` on a protocol
    /// violation. Call in a loop until it yields `None`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<(u32, Message)>> {
        loop {
            let Some(progress) = self.decode_chunk(buf)? else {
                return Ok(None); // need more bytes
            };
            if let Some(completed) = progress {
                return Ok(Some(completed));
            }
            // a mid-message chunk was consumed; keep going
        }
    }

    /// Consume at most one chunk. Outer `Option`: is a full chunk
    /// buffered; inner `Option`: did it complete a message.
    #[allow(clippy::type_complexity)]
    fn decode_chunk(&mut self, buf: &mut BytesMut) -> Result<Option<Option<(u32, Message)>>> {
        let Some((fmt, csid, bh_len)) = peek_basic_header(buf) else {
            return Ok(None);
        };

        let prior = *self.prior.get(&csid).unwrap_or(&PriorHeader::Uninitialized);
        if fmt != 0 && prior == PriorHeader::Uninitialized {
            return Err(ProtocolError::NoPriorChunk(csid).into());
        }

        let mh_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        if buf.len() < bh_len + mh_len {
            return Ok(None);
        }

        // 0xFFFFFF in the 3-byte field announces a 4-byte extended
        // timestamp; a format 3 chunk carries one iff its predecessor did.
        let has_extended = if fmt == 3 {
            prior.extended()
        } else {
            peek_u24(buf, bh_len) == EXTENDED_TIMESTAMP
        };
        let header_len = bh_len + mh_len + if has_extended { 4 } else { 0 };
        if buf.len() < header_len {
            return Ok(None);
        }

        let assembly = self.assembly.entry(csid).or_default();
        let continuation = assembly.in_progress;

        // Declared length of the message this chunk belongs to. Checked
        // against the cap before any payload byte is buffered.
        let length = if continuation {
            assembly.expected
        } else {
            match fmt {
                0 | 1 => peek_u24(buf, bh_len + 3),
                _ => prior.fields().map(|(_, len, _, _)| len).unwrap_or(0),
            }
        };
        if length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: length,
                max: self.max_message_size,
            }
            .into());
        }

        let already = assembly.partial.len() as u32;
        let fragment = (length - already).min(self.chunk_size) as usize;
        if buf.len() < header_len + fragment {
            return Ok(None);
        }

        // The whole chunk is buffered; consume it.
        buf.advance(bh_len);
        let next = consume_message_header(buf, fmt, has_extended, prior, continuation);

        let assembly = self.assembly.get_mut(&csid).expect("entry created above");
        if !continuation {
            let (_, _, _, timestamp) = next.fields().expect("set by consume_message_header");
            assembly.expected = length;
            assembly.timestamp = timestamp;
            assembly.in_progress = true;
            assembly.partial.reserve(length as usize);
            self.prior.insert(csid, next);
        }

        assembly.partial.put_slice(&buf[..fragment]);
        buf.advance(fragment);

        if assembly.partial.len() as u32 == assembly.expected {
            let payload = assembly.partial.split().freeze();
            assembly.expected = 0;
            assembly.in_progress = false;

            let (stream_id, _, type_id, _) = self
                .prior
                .get(&csid)
                .and_then(PriorHeader::fields)
                .expect("prior state set before completion");

            return Ok(Some(Some((
                csid,
                Message {
                    stream_id,
                    type_id,
                    timestamp: assembly.timestamp,
                    payload,
                },
            ))));
        }

        Ok(Some(None))
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Consume the message header (and extended timestamp) and return the
/// prior-header state after this chunk.
///
/// Continuation chunks conventionally use format 3 but peers may resend
/// any format with identical parameters; their fields are consumed and
/// the stored state left untouched.
fn consume_message_header(
    buf: &mut BytesMut,
    fmt: u8,
    has_extended: bool,
    prior: PriorHeader,
    continuation: bool,
) -> PriorHeader {
    let read_ts_field = |buf: &mut BytesMut| -> u32 {
        let field = peek_u24(buf, 0);
        buf.advance(3);
        field
    };

    let next = match fmt {
        0 => {
            let ts_field = read_ts_field(buf);
            let length = peek_u24(buf, 0);
            buf.advance(3);
            let type_id = buf.get_u8();
            let stream_id = buf.get_u32_le();
            let timestamp = if has_extended { buf.get_u32() } else { ts_field };
            PriorHeader::HaveFull {
                stream_id,
                length,
                type_id,
                timestamp,
                extended: has_extended,
            }
        }
        1 => {
            let ts_field = read_ts_field(buf);
            let length = peek_u24(buf, 0);
            buf.advance(3);
            let type_id = buf.get_u8();
            let delta = if has_extended { buf.get_u32() } else { ts_field };
            let (stream_id, _, _, timestamp) = prior.fields().expect("checked by caller");
            PriorHeader::HaveDelta {
                stream_id,
                length,
                type_id,
                timestamp: advance_timestamp(timestamp, delta),
                delta,
                extended: has_extended,
            }
        }
        2 => {
            let ts_field = read_ts_field(buf);
            let delta = if has_extended { buf.get_u32() } else { ts_field };
            let (stream_id, length, type_id, timestamp) =
                prior.fields().expect("checked by caller");
            PriorHeader::HaveDelta {
                stream_id,
                length,
                type_id,
                timestamp: advance_timestamp(timestamp, delta),
                delta,
                extended: has_extended,
            }
        }
        _ => {
            // Format 3 repeats the extended timestamp of its
            // predecessor; the value restates the known delta.
            if has_extended {
                buf.advance(4);
            }
            let delta = prior.implied_delta();
            let (stream_id, length, type_id, timestamp) =
                prior.fields().expect("checked by caller");
            PriorHeader::HaveDelta {
                stream_id,
                length,
                type_id,
                timestamp: if continuation {
                    timestamp
                } else {
                    advance_timestamp(timestamp, delta)
                },
                delta,
                extended: prior.extended(),
            }
        }
    };

    if continuation {
        prior
    } else {
        next
    }
}

/// Chunk stream encoder: splits messages into chunks, choosing the most
/// compact header format the prior state on the chunk stream permits.
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: u32,
    prior: HashMap<u32, PriorHeader>,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            prior: HashMap::new(),
        }
    }

    /// Set the outbound chunk size. The peer must be told through a Set
    /// Chunk Size message before larger chunks are emitted.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Chunk a message onto `buf` on the given chunk stream
    pub fn encode(&mut self, csid: u32, message: &Message, buf: &mut BytesMut) -> Result<()> {
        if message.payload.len() > MAX_CHUNK_SIZE as usize {
            return Err(UsageError::PayloadTooLong(message.payload.len()).into());
        }

        let prior = *self.prior.get(&csid).unwrap_or(&PriorHeader::Uninitialized);
        let fmt = select_format(message, prior);

        let (_, _, _, prior_ts) = prior.fields().unwrap_or((0, 0, 0, 0));
        let delta = message.timestamp.wrapping_sub(prior_ts);

        // Field value and what an extended timestamp would carry
        let (field, extended) = match fmt {
            0 => (message.timestamp, message.timestamp >= EXTENDED_TIMESTAMP),
            3 => (delta, prior.extended()),
            _ => (delta, delta >= EXTENDED_TIMESTAMP),
        };

        let length = message.payload.len() as u32;
        let mut offset = 0usize;
        let mut first = true;

        loop {
            let fragment = ((length as usize) - offset).min(self.chunk_size as usize);
            write_basic_header(if first { fmt } else { 3 }, csid, buf)?;

            if first {
                match fmt {
                    0 => {
                        put_u24(field.min(EXTENDED_TIMESTAMP), buf);
                        put_u24(length, buf);
                        buf.put_u8(message.type_id);
                        buf.put_u32_le(message.stream_id);
                    }
                    1 => {
                        put_u24(field.min(EXTENDED_TIMESTAMP), buf);
                        put_u24(length, buf);
                        buf.put_u8(message.type_id);
                    }
                    2 => {
                        put_u24(field.min(EXTENDED_TIMESTAMP), buf);
                    }
                    _ => {}
                }
            }
            if extended {
                buf.put_u32(field);
            }

            buf.put_slice(&message.payload[offset..offset + fragment]);
            offset += fragment;
            first = false;

            if offset >= length as usize {
                break;
            }
        }

        self.prior.insert(
            csid,
            match fmt {
                0 => PriorHeader::HaveFull {
                    stream_id: message.stream_id,
                    length,
                    type_id: message.type_id,
                    timestamp: message.timestamp,
                    extended,
                },
                _ => PriorHeader::HaveDelta {
                    stream_id: message.stream_id,
                    length,
                    type_id: message.type_id,
                    timestamp: message.timestamp,
                    delta,
                    extended,
                },
            },
        );

        Ok(())
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the most compact format consistent with prior state: format 1
/// needs the same message stream id, format 2 additionally the same
/// length and type, format 3 additionally the same timestamp delta.
fn select_format(message: &Message, prior: PriorHeader) -> u8 {
    let Some((stream_id, length, type_id, timestamp)) = prior.fields() else {
        return 0;
    };
    if message.stream_id != stream_id {
        return 0;
    }
    if message.timestamp < timestamp {
        // backwards timestamp cannot be expressed as a delta
        return 0;
    }
    if message.payload.len() as u32 != length || message.type_id != type_id {
        return 1;
    }
    if message.timestamp.wrapping_sub(timestamp) == prior.implied_delta() {
        return 3;
    }
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::constants::{CSID_COMMAND, MSG_AUDIO, MSG_COMMAND_AMF0, MSG_VIDEO};

    fn msg(stream_id: u32, type_id: u8, timestamp: u32, payload: &[u8]) -> Message {
        Message {
            stream_id,
            type_id,
            timestamp,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn test_basic_header_forms() {
        assert_eq!(peek_basic_header(&[0x03]), Some((0, 3, 1)));
        assert_eq!(peek_basic_header(&[0xC5]), Some((3, 5, 1)));
        assert_eq!(peek_basic_header(&[0x40, 0x00]), Some((1, 64, 2)));
        assert_eq!(peek_basic_header(&[0x00, 0xFF]), Some((0, 319, 2)));
        assert_eq!(peek_basic_header(&[0x01, 0x00, 0x01]), Some((0, 320, 3)));
        assert_eq!(peek_basic_header(&[0x01, 0xFF, 0xFF]), Some((0, 65599, 3)));
        // incomplete multi-byte forms
        assert_eq!(peek_basic_header(&[0x00]), None);
        assert_eq!(peek_basic_header(&[0x01, 0x00]), None);
    }

    #[test]
    fn test_basic_header_write_is_minimal() {
        for (csid, expect) in [
            (2u32, vec![0x02u8]),
            (63, vec![0x3F]),
            (64, vec![0x00, 0x00]),
            (319, vec![0x00, 0xFF]),
            (320, vec![0x01, 0x00, 0x01]),
            (65599, vec![0x01, 0xFF, 0xFF]),
        ] {
            let mut buf = BytesMut::new();
            write_basic_header(0, csid, &mut buf).unwrap();
            assert_eq!(&buf[..], &expect[..], "csid {csid}");
            let (fmt, parsed, len) = peek_basic_header(&buf).unwrap();
            assert_eq!((fmt, parsed, len), (0, csid, expect.len()));
        }
    }

    #[test]
    fn test_basic_header_rejects_out_of_range_ids() {
        for csid in [0u32, 1, 65600, u32::MAX] {
            let mut buf = BytesMut::new();
            let err = write_basic_header(0, csid, &mut buf).unwrap_err();
            assert!(matches!(
                err,
                Error::Usage(UsageError::ChunkStreamIdOutOfRange(id)) if id == csid
            ));
        }
    }

    #[test]
    fn test_format0_wire_layout_stream_id_little_endian() {
        // golden vector: the message stream id is the sole LE field
        let mut encoder = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        encoder
            .encode(3, &msg(0x01020304, MSG_COMMAND_AMF0, 0x0A0B0C, b"x"), &mut buf)
            .unwrap();
        assert_eq!(
            &buf[..],
            &[
                0x03, // fmt 0, csid 3
                0x0A, 0x0B, 0x0C, // timestamp
                0x00, 0x00, 0x01, // length
                20,   // type id
                0x04, 0x03, 0x02, 0x01, // stream id, little-endian
                b'x',
            ]
        );
    }

    fn roundtrip_with_chunk_size(chunk_size: u32, payload_len: usize) {
        let payload: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();
        let original = msg(1, MSG_VIDEO, 5000, &payload);

        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(chunk_size);
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(chunk_size).unwrap();

        let mut wire = BytesMut::new();
        encoder.encode(6, &original, &mut wire).unwrap();

        let (csid, decoded) = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(csid, 6);
        assert_eq!(decoded, original);
        assert!(wire.is_empty());
    }

    #[test]
    fn test_roundtrip_across_chunk_sizes() {
        for chunk_size in [1, 128, 4096, MAX_CHUNK_SIZE] {
            roundtrip_with_chunk_size(chunk_size, 1000);
        }
        roundtrip_with_chunk_size(128, 0);
        roundtrip_with_chunk_size(128, 128);
        roundtrip_with_chunk_size(128, 129);
    }

    #[test]
    fn test_decoder_handles_partial_arrivals() {
        let payload: Vec<u8> = (0..300).map(|i| i as u8).collect();
        let original = msg(1, MSG_AUDIO, 77, &payload);

        let mut encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        encoder.encode(4, &original, &mut wire).unwrap();

        // feed one byte at a time; decode must never consume a torn chunk
        let mut decoder = ChunkDecoder::new();
        let mut feed = BytesMut::new();
        let mut result = None;
        for byte in wire.iter() {
            feed.put_u8(*byte);
            if let Some(decoded) = decoder.decode(&mut feed).unwrap() {
                result = Some(decoded);
            }
        }
        let (_, decoded) = result.expect("message completes at final byte");
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_interleaved_chunk_streams() {
        let mut encoder_a = ChunkEncoder::new();
        let mut encoder_b = ChunkEncoder::new();

        let long = vec![0xAAu8; 200]; // two chunks at size 128
        let a = msg(1, MSG_VIDEO, 10, &long);
        let b = msg(1, MSG_AUDIO, 10, b"short");

        let mut wire_a = BytesMut::new();
        encoder_a.encode(6, &a, &mut wire_a).unwrap();
        let mut wire_b = BytesMut::new();
        encoder_b.encode(4, &b, &mut wire_b).unwrap();

        // splice b's single chunk between a's two chunks
        let split = 12 + 128; // fmt0 header + first fragment
        let mut wire = BytesMut::new();
        wire.put_slice(&wire_a[..split]);
        wire.put_slice(&wire_b);
        wire.put_slice(&wire_a[split..]);

        let mut decoder = ChunkDecoder::new();
        let (csid_first, first) = decoder.decode(&mut wire).unwrap().unwrap();
        let (csid_second, second) = decoder.decode(&mut wire).unwrap().unwrap();

        // b completes first even though a started first
        assert_eq!(csid_first, 4);
        assert_eq!(first, b);
        assert_eq!(csid_second, 6);
        assert_eq!(second, a);
    }

    #[test]
    fn test_header_compression_format0_then_format3() {
        // identical stream id, length, type and delta: the second message
        // compresses all the way down to format 3
        let first = msg(1, MSG_VIDEO, 40, b"payload!");
        let second = msg(1, MSG_VIDEO, 80, b"payload2");

        let mut encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        encoder.encode(6, &first, &mut wire).unwrap();
        let first_len = wire.len();
        encoder.encode(6, &second, &mut wire).unwrap();

        assert_eq!(wire[0] >> 6, 0);
        assert_eq!(wire[first_len] >> 6, 3);
        // format 3 header is the lone basic-header byte
        assert_eq!(wire.len(), first_len + 1 + second.payload.len());

        let mut decoder = ChunkDecoder::new();
        let (_, d1) = decoder.decode(&mut wire).unwrap().unwrap();
        let (_, d2) = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(d1.timestamp, 40);
        assert_eq!(d2.timestamp, 80);
        assert_eq!(d2, second);
    }

    #[test]
    fn test_format_selection_ladder() {
        let mut encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();

        // new stream: format 0
        encoder.encode(5, &msg(1, MSG_VIDEO, 0, b"aaaa"), &mut wire).unwrap();
        assert_eq!(wire[0] >> 6, 0);
        wire.clear();

        // same stream id, different length: format 1
        encoder.encode(5, &msg(1, MSG_VIDEO, 20, b"bb"), &mut wire).unwrap();
        assert_eq!(wire[0] >> 6, 1);
        wire.clear();

        // same length/type, new delta: format 2
        encoder.encode(5, &msg(1, MSG_VIDEO, 50, b"cc"), &mut wire).unwrap();
        assert_eq!(wire[0] >> 6, 2);
        wire.clear();

        // same delta again: format 3
        encoder.encode(5, &msg(1, MSG_VIDEO, 80, b"dd"), &mut wire).unwrap();
        assert_eq!(wire[0] >> 6, 3);
        wire.clear();

        // different message stream id: back to format 0
        encoder.encode(5, &msg(2, MSG_VIDEO, 90, b"ee"), &mut wire).unwrap();
        assert_eq!(wire[0] >> 6, 0);
    }

    #[test]
    fn test_compressed_header_without_prior_state() {
        for first_byte in [0x46u8, 0x86, 0xC6] {
            let mut decoder = ChunkDecoder::new();
            let mut wire = BytesMut::new();
            wire.put_u8(first_byte);
            wire.put_slice(&[0u8; 16]);
            let err = decoder.decode(&mut wire).unwrap_err();
            assert!(
                matches!(err, Error::Protocol(ProtocolError::NoPriorChunk(6))),
                "fmt byte {first_byte:#x}"
            );
        }
    }

    #[test]
    fn test_timestamp_wraparound_at_2_pow_24() {
        // prior absolute 0x00FFFFFE plus delta 5 rolls over to 3
        let mut decoder = ChunkDecoder::new();
        let mut wire = BytesMut::new();

        // format 0: ts=0xFFFFFE, len=1, type=9, msid=1
        wire.put_u8(0x06);
        wire.put_slice(&[0xFF, 0xFF, 0xFE, 0x00, 0x00, 0x01, 0x09]);
        wire.put_u32_le(1);
        wire.put_u8(0);
        // format 2: delta=5
        wire.put_u8(0x86);
        wire.put_slice(&[0x00, 0x00, 0x05]);
        wire.put_u8(0);

        let (_, first) = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(first.timestamp, 0x00FF_FFFE);
        let (_, second) = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(second.timestamp, 3);
    }

    #[test]
    fn test_extended_timestamp_roundtrip() {
        let original = msg(1, MSG_VIDEO, 0x0123_4567, b"ext");

        let mut encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        encoder.encode(6, &original, &mut wire).unwrap();

        // the 3-byte field must hold the sentinel, then the 4-byte value
        assert_eq!(peek_u24(&wire, 1), EXTENDED_TIMESTAMP);
        assert_eq!(&wire[12..16], &0x0123_4567u32.to_be_bytes());

        let mut decoder = ChunkDecoder::new();
        let (_, decoded) = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_timestamp_0xffffff_is_not_literal() {
        // a 24-bit field of exactly 0xFFFFFF must be read as a sentinel
        let mut wire = BytesMut::new();
        wire.put_u8(0x06);
        wire.put_slice(&[0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x01, 0x09]);
        wire.put_u32_le(1);
        wire.put_u32(0xFFFFFF); // extended timestamp carries the real value
        wire.put_u8(0);

        let mut decoder = ChunkDecoder::new();
        let (_, decoded) = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(decoded.timestamp, 0xFFFFFF);
    }

    #[test]
    fn test_extended_timestamp_repeats_on_continuation_chunks() {
        let payload = vec![1u8; 200];
        let original = msg(1, MSG_VIDEO, 0x0100_0000, &payload);

        let mut encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        encoder.encode(6, &original, &mut wire).unwrap();

        // second chunk: fmt 3 basic header followed by the extended field
        let second_chunk = 1 + 11 + 4 + 128;
        assert_eq!(wire[second_chunk] >> 6, 3);
        assert_eq!(
            &wire[second_chunk + 1..second_chunk + 5],
            &0x0100_0000u32.to_be_bytes()
        );

        let mut decoder = ChunkDecoder::new();
        let (_, decoded) = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_message_over_cap_rejected_before_buffering() {
        // format 0 header declaring one byte over the cap, with no payload
        // behind it: the error fires on the header alone
        let mut decoder = ChunkDecoder::with_max_message_size(1024);
        let mut wire = BytesMut::new();
        wire.put_u8(0x06);
        wire.put_slice(&[0x00, 0x00, 0x00]); // timestamp
        put_u24(1025, &mut wire); // declared length: cap + 1
        wire.put_u8(MSG_VIDEO);
        wire.put_u32_le(1);

        let err = decoder.decode(&mut wire).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MessageTooLarge {
                size: 1025,
                max: 1024
            })
        ));
    }

    #[test]
    fn test_set_chunk_size_applies_to_subsequent_chunks() {
        let payload = vec![7u8; 256];
        let original = msg(1, MSG_VIDEO, 0, &payload);

        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(4096);
        let mut wire = BytesMut::new();
        encoder.encode(6, &original, &mut wire).unwrap();

        // decoder still at 128 would misparse; after the update it's fine
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(4096).unwrap();
        let (_, decoded) = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_chunk_size_out_of_range() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.set_chunk_size(0).is_err());
        assert!(decoder.set_chunk_size(0x0100_0000).is_err());
        assert!(decoder.set_chunk_size(MAX_CHUNK_SIZE).is_ok());
    }

    #[test]
    fn test_abort_drops_partial_message() {
        let payload = vec![3u8; 200];
        let mut encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        encoder.encode(6, &msg(1, MSG_VIDEO, 0, &payload), &mut wire).unwrap();

        let mut decoder = ChunkDecoder::new();
        // feed only the first chunk, then abort
        let first_chunk = 12 + 128;
        let mut partial = BytesMut::from(&wire[..first_chunk]);
        assert!(decoder.decode(&mut partial).unwrap().is_none());
        decoder.abort(6);

        // a fresh complete message on the same stream still decodes
        let mut wire2 = BytesMut::new();
        encoder.encode(6, &msg(1, MSG_VIDEO, 40, b"next"), &mut wire2).unwrap();
        let (_, decoded) = decoder.decode(&mut wire2).unwrap().unwrap();
        assert_eq!(decoded.payload.as_ref(), b"next");
    }

    #[test]
    fn test_payload_over_24_bit_length_rejected() {
        let huge = vec![0u8; MAX_CHUNK_SIZE as usize + 1];
        let mut encoder = ChunkEncoder::new();
        let mut wire = BytesMut::new();
        let err = encoder
            .encode(CSID_COMMAND, &msg(0, MSG_COMMAND_AMF0, 0, &huge), &mut wire)
            .unwrap_err();
        assert!(matches!(err, Error::Usage(UsageError::PayloadTooLong(_))));
    }

    #[test]
    fn test_continuation_accepts_non_format3_with_identical_params() {
        // 200-byte message: first chunk fmt 0, second resends fmt 0 with
        // identical parameters instead of the conventional fmt 3
        let payload: Vec<u8> = (0..200).map(|i| i as u8).collect();
        let mut wire = BytesMut::new();
        for fragment in [&payload[..128], &payload[128..]] {
            wire.put_u8(0x06);
            wire.put_slice(&[0x00, 0x00, 0x2A]); // ts 42
            put_u24(200, &mut wire);
            wire.put_u8(MSG_VIDEO);
            wire.put_u32_le(1);
            wire.put_slice(fragment);
        }

        let mut decoder = ChunkDecoder::new();
        let (_, decoded) = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(decoded.timestamp, 42);
        assert_eq!(decoded.payload.as_ref(), &payload[..]);
    }
}
