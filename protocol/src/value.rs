//! Decoded field values, independent of the wire encoding.

use crate::packet::Packet;

/// An ordered name/value row, as produced for one record of a
/// list-of-records field.
pub type Row = Vec<(String, Value)>;

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(u64),
    Str(String),
    StrList(Vec<String>),
    IntList(Vec<u64>),
    Records(Vec<Row>),
    Packet(Box<Packet>),
    /// A conditional field whose selector did not match any arm.
    Absent,
}

impl Value {
    /// Integer view; non-integers read as zero.
    pub fn as_int(&self) -> u64 {
        match self {
            Value::Int(v) => *v,
            _ => 0,
        }
    }

    /// String view; non-strings read as empty.
    pub fn as_str(&self) -> &str {
        match self {
            Value::Str(s) => s,
            _ => "",
        }
    }

    pub fn as_str_list(&self) -> &[String] {
        match self {
            Value::StrList(v) => v,
            _ => &[],
        }
    }

    pub fn as_int_list(&self) -> &[u64] {
        match self {
            Value::IntList(v) => v,
            _ => &[],
        }
    }

    pub fn as_packet(&self) -> Option<&Packet> {
        match self {
            Value::Packet(p) => Some(p),
            _ => None,
        }
    }

    /// JSON projection of one value; `Absent` has no projection.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Str(s) => serde_json::Value::from(s.as_str()),
            Value::StrList(list) => serde_json::Value::from(list.clone()),
            Value::IntList(list) => serde_json::Value::from(list.clone()),
            Value::Records(rows) => serde_json::Value::Array(
                rows.iter()
                    .map(|row| {
                        let mut obj = serde_json::Map::new();
                        for (name, value) in row {
                            if let Some(json) = value.to_json() {
                                obj.insert(name.clone(), json);
                            }
                        }
                        serde_json::Value::Object(obj)
                    })
                    .collect(),
            ),
            Value::Packet(packet) => packet.to_json(),
            Value::Absent => return None,
        })
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as u64)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(v as u64)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(v as u64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Packet> for Value {
    fn from(p: Packet) -> Self {
        Value::Packet(Box::new(p))
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StrList(v)
    }
}

impl From<Vec<u64>> for Value {
    fn from(v: Vec<u64>) -> Self {
        Value::IntList(v)
    }
}
