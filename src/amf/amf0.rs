//! AMF0 encoder and decoder
//!
//! Grammar (all integers big-endian):
//!
//! ```text
//! value   := number | boolean | string | object | null
//! number  := 0x00 <f64>
//! boolean := 0x01 <byte: 0x00 = false, else true>
//! string  := 0x02 <u16 length> <UTF-8 bytes>
//! object  := 0x03 (property)* 0x00 0x00 0x09
//! property:= <u16 key length, nonzero> <UTF-8 key> value
//! null    := 0x05
//! message := value*
//! ```
//!
//! The decoder is a single-pass cursor over the payload: the cursor itself
//! bounds every nested object, so no end-marker pre-scan is needed. Each
//! read is length-checked first and truncation surfaces as
//! [`AmfError::UnexpectedEof`]; the decoder returns errors, never panics.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::AmfError;
use super::value::Amf0Value;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_OBJECT_END: u8 = 0x09;

/// 16-bit length field: 0xFFFF is unrepresentable as an exact length
const MAX_STRING_LEN: usize = 0xFFFE;

/// Decode all values from a command payload, in order
pub fn decode(data: &[u8]) -> Result<Vec<Amf0Value>, AmfError> {
    let mut buf = Bytes::copy_from_slice(data);
    let mut values = Vec::new();
    while buf.has_remaining() {
        values.push(decode_value(&mut buf)?);
    }
    Ok(values)
}

/// Decode a single value, advancing the cursor past exactly its bytes
pub fn decode_value(buf: &mut Bytes) -> Result<Amf0Value, AmfError> {
    if !buf.has_remaining() {
        return Err(AmfError::UnexpectedEof);
    }

    match buf.get_u8() {
        MARKER_NUMBER => {
            if buf.remaining() < 8 {
                return Err(AmfError::UnexpectedEof);
            }
            Ok(Amf0Value::Number(buf.get_f64()))
        }
        MARKER_BOOLEAN => {
            if !buf.has_remaining() {
                return Err(AmfError::UnexpectedEof);
            }
            Ok(Amf0Value::Boolean(buf.get_u8() != 0))
        }
        MARKER_STRING => Ok(Amf0Value::String(read_utf8(buf)?)),
        MARKER_OBJECT => decode_object(buf),
        MARKER_NULL => Ok(Amf0Value::Null),
        other => Err(AmfError::UnknownMarker(other)),
    }
}

fn decode_object(buf: &mut Bytes) -> Result<Amf0Value, AmfError> {
    let mut props = Vec::new();

    loop {
        let key = read_utf8(buf)?;

        // A zero-length key is the end sigil; the 0x09 marker must follow.
        if key.is_empty() {
            if !buf.has_remaining() {
                return Err(AmfError::UnexpectedEof);
            }
            if buf.get_u8() != MARKER_OBJECT_END {
                return Err(AmfError::MissingObjectEnd);
            }
            return Ok(Amf0Value::Object(props));
        }

        props.push((key, decode_value(buf)?));
    }
}

/// Read a UTF-8 string with a 16-bit length prefix (no type marker)
fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 2 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// Encode a sequence of values into one command payload
pub fn encode(values: &[Amf0Value]) -> Result<Bytes, AmfError> {
    let mut buf = BytesMut::with_capacity(64);
    for value in values {
        encode_into(value, &mut buf)?;
    }
    Ok(buf.freeze())
}

/// Encode a single value
pub fn encode_value(value: &Amf0Value) -> Result<Bytes, AmfError> {
    let mut buf = BytesMut::with_capacity(16);
    encode_into(value, &mut buf)?;
    Ok(buf.freeze())
}

fn encode_into(value: &Amf0Value, buf: &mut BytesMut) -> Result<(), AmfError> {
    match value {
        Amf0Value::Number(n) => {
            buf.put_u8(MARKER_NUMBER);
            buf.put_f64(*n);
        }
        Amf0Value::Boolean(b) => {
            buf.put_u8(MARKER_BOOLEAN);
            buf.put_u8(u8::from(*b));
        }
        Amf0Value::String(s) => {
            buf.put_u8(MARKER_STRING);
            write_utf8(s, buf)?;
        }
        Amf0Value::Object(props) => {
            buf.put_u8(MARKER_OBJECT);
            for (key, val) in props {
                write_utf8(key, buf)?;
                encode_into(val, buf)?;
            }
            buf.put_u16(0);
            buf.put_u8(MARKER_OBJECT_END);
        }
        Amf0Value::Null => {
            buf.put_u8(MARKER_NULL);
        }
    }
    Ok(())
}

fn write_utf8(s: &str, buf: &mut BytesMut) -> Result<(), AmfError> {
    if s.len() > MAX_STRING_LEN {
        return Err(AmfError::StringTooLong(s.len()));
    }
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}
