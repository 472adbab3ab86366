use serde::{Deserialize, Serialize};
use super::value::Value;

/// Backend-assigned row key.
///
/// Keys are opaque bytes compared lexicographically. Keys allocated from a
/// counter are big-endian, so key order is allocation order; the key-value
/// backend keys PRIMARY KEY tables by the sortable encoding of the key value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    #[must_use]
    pub fn from_id(id: u64) -> Self {
        Self(id.to_be_bytes().to_vec())
    }

    /// Counter value of a key made by [`Key::from_id`]
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.0.as_slice().try_into().ok().map(u64::from_be_bytes)
    }

    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self(value.sort_key())
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub const fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}
