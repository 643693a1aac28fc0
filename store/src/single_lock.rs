use std::collections::HashMap;

use key_value::{Key, Value};
use parking_lot::RwLock;

use crate::KvBackend;

/// Every operation goes through one lock over one map.
#[derive(Debug, Default)]
pub struct SingleLockMap {
    data: RwLock<HashMap<Key, Value>>,
}

impl SingleLockMap {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for SingleLockMap {
    fn get(&self, key: &[u8]) -> Value {
        self.data.read().get(key).cloned().unwrap_or_default()
    }

    fn put(&self, key: Key, value: Value) {
        self.data.write().insert(key, value);
    }

    fn batch_get(&self, keys: &[Key]) -> Vec<Value> {
        let data = self.data.read();
        keys.iter()
            .map(|key| data.get(key).cloned().unwrap_or_default())
            .collect()
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }
}
