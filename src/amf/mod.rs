//! AMF0 (Action Message Format) implementation
//!
//! AMF0 is Adobe's binary serialization format used by RTMP command
//! messages (type 20). A command payload is an ordered sequence of
//! self-describing values; element 0 is the command name, element 1 the
//! transaction id.

pub mod amf0;
pub mod value;

pub use amf0::{decode, decode_value, encode, encode_value};
pub use value::Amf0Value;
