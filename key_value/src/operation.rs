use std::sync::Arc;

use crate::{Key, encode_key};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Get { key: u64 },
    // the payload is shared across every write a generator produces
    Put { key: u64, value: Arc<[u8]> },
}

impl Operation {
    pub fn is_read(&self) -> bool {
        matches!(self, Operation::Get { .. })
    }

    pub fn key_id(&self) -> u64 {
        match self {
            Operation::Get { key } | Operation::Put { key, .. } => *key,
        }
    }

    pub fn key(&self) -> Key {
        encode_key(self.key_id())
    }

    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Operation::Get { .. } => None,
            Operation::Put { value, .. } => Some(value),
        }
    }
}
