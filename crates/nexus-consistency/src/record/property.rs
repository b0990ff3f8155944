//! Property chains and dynamic overflow blocks

use super::{KeyId, NULL_REF, link};
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// A decoded property value
///
/// Floats compare and hash by bit pattern so values can key index lookups.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// 64-bit integer value
    Int(i64),
    /// 64-bit floating point value
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Array of 64-bit integers
    IntArray(Vec<i64>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::IntArray(a), Value::IntArray(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::IntArray(v) => v.hash(state),
        }
    }
}

impl Value {
    /// JSON form used in exported violation records
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Encode a string or array value into dynamic block bytes
    pub fn to_dynamic_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::String(s) => Some(s.as_bytes().to_vec()),
            Value::IntArray(items) => Some(items.iter().flat_map(|v| v.to_le_bytes()).collect()),
            _ => None,
        }
    }

    /// Decode bytes read from the string store
    pub fn decode_string(bytes: &[u8]) -> Option<Value> {
        std::str::from_utf8(bytes)
            .ok()
            .map(|s| Value::String(s.to_string()))
    }

    /// Decode bytes read from the array store
    pub fn decode_int_array(bytes: &[u8]) -> Option<Value> {
        if bytes.len() % 8 != 0 {
            return None;
        }
        let items = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                i64::from_le_bytes(raw)
            })
            .collect();
        Some(Value::IntArray(items))
    }
}

/// Stored representation of a property value inside a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockValue {
    /// Value small enough to live in the block itself
    Inline(Value),
    /// Long string in the string store
    String {
        /// First block of the string chain
        first_block: u64,
    },
    /// Array in the array store
    Array {
        /// First block of the array chain
        first_block: u64,
    },
    /// Undecodable type tag
    Invalid {
        /// Raw type tag found in the block header
        type_tag: u8,
    },
}

/// One key/value slot of a property record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBlock {
    /// Property key ID
    pub key: KeyId,
    /// Value or pointer to its dynamic chain
    pub value: BlockValue,
}

impl PropertyBlock {
    /// Block holding an inline value
    pub fn inline(key: KeyId, value: Value) -> Self {
        Self {
            key,
            value: BlockValue::Inline(value),
        }
    }
}

/// Property record in props.store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    /// Property record ID
    pub id: u64,
    /// Whether the record is live
    pub in_use: bool,
    /// Previous record in the chain
    pub prev: u64,
    /// Next record in the chain
    pub next: u64,
    /// Key/value blocks
    pub blocks: Vec<PropertyBlock>,
}

impl PropertyRecord {
    /// Create an in-use record with no neighbours
    pub fn new(id: u64, blocks: Vec<PropertyBlock>) -> Self {
        Self {
            id,
            in_use: true,
            prev: NULL_REF,
            next: NULL_REF,
            blocks,
        }
    }

    /// Create a record for an unused slot
    pub fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, Vec::new())
        }
    }

    /// Previous record, if any
    pub fn prev_record(&self) -> Option<u64> {
        link(self.prev)
    }

    /// Next record, if any
    pub fn next_record(&self) -> Option<u64> {
        link(self.next)
    }
}

/// Block of a dynamic store (strings, arrays, label sets, token names)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicRecord {
    /// Block ID within its store
    pub id: u64,
    /// Whether the block is live
    pub in_use: bool,
    /// Payload bytes held by this block
    pub data: Vec<u8>,
    /// Next block of the chain
    pub next: u64,
}

impl DynamicRecord {
    /// Create an in-use terminal block
    pub fn new(id: u64, data: Vec<u8>) -> Self {
        Self {
            id,
            in_use: true,
            data,
            next: NULL_REF,
        }
    }

    /// Create a record for an unused slot
    pub fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, Vec::new())
        }
    }

    /// Next block, if any
    pub fn next_block(&self) -> Option<u64> {
        link(self.next)
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block carries no payload
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
