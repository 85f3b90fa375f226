//! AMF0 value model
//!
//! Objects are ordered: AMF0 serializes properties in sequence and peers
//! are known to care about the order of `_result` info fields, so the
//! representation is a property list rather than a hash map.

/// A single AMF0 value
#[derive(Debug, Clone, PartialEq)]
pub enum Amf0Value {
    /// IEEE 754 double (marker 0x00)
    Number(f64),

    /// Boolean (marker 0x01)
    Boolean(bool),

    /// UTF-8 string, at most 65534 bytes (marker 0x02)
    String(String),

    /// Ordered key/value properties (marker 0x03, terminated 0x00 0x00 0x09)
    Object(Vec<(String, Amf0Value)>),

    /// Null (marker 0x05)
    Null,
}

impl Amf0Value {
    /// Try to view this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Amf0Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to view this value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Amf0Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to view this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Amf0Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to view this value as an object property list
    pub fn as_object(&self) -> Option<&[(String, Amf0Value)]> {
        match self {
            Amf0Value::Object(props) => Some(props),
            _ => None,
        }
    }

    /// Look up a property of an object value. First match wins.
    pub fn get(&self, key: &str) -> Option<&Amf0Value> {
        self.as_object()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Look up a string property of an object value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }
}

impl From<f64> for Amf0Value {
    fn from(v: f64) -> Self {
        Amf0Value::Number(v)
    }
}

impl From<bool> for Amf0Value {
    fn from(v: bool) -> Self {
        Amf0Value::Boolean(v)
    }
}

impl From<String> for Amf0Value {
    fn from(v: String) -> Self {
        Amf0Value::String(v)
    }
}

impl From<&str> for Amf0Value {
    fn from(v: &str) -> Self {
        Amf0Value::String(v.to_string())
    }
}

/// Build an object value from `(key, value)` pairs, preserving order
pub fn object<K, V>(props: impl IntoIterator<Item = (K, V)>) -> Amf0Value
where
    K: Into<String>,
    V: Into<Amf0Value>,
{
    Amf0Value::Object(
        props
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}
