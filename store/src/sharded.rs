use std::{collections::HashMap, hash::Hasher};

use fnv::FnvHasher;
use key_value::{Key, Value};
use parking_lot::RwLock;

use crate::{KvBackend, error::StoreError};

type Shard = RwLock<HashMap<Key, Value>>;

/// Fixed set of independently locked maps. A key lives in shard
/// `fnv1a64(key) % shard_count`; at most one shard lock is held at a time.
#[derive(Debug)]
pub struct ShardedMap {
    shards: Box<[Shard]>,
}

/// 64-bit FNV-1a.
pub fn fnv1a64(key: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    hasher.finish()
}

pub fn shard_of(key: &[u8], shard_count: usize) -> usize {
    (fnv1a64(key) % shard_count as u64) as usize
}

impl ShardedMap {
    pub fn new(shard_count: usize) -> Result<Self, StoreError> {
        if shard_count == 0 {
            return Err(StoreError::InvalidShardCount);
        }
        let shards = (0..shard_count)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Ok(Self { shards })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_of(&self, key: &[u8]) -> usize {
        shard_of(key, self.shards.len())
    }

    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_of(key)]
    }
}

impl KvBackend for ShardedMap {
    fn get(&self, key: &[u8]) -> Value {
        self.shard(key).read().get(key).cloned().unwrap_or_default()
    }

    fn put(&self, key: Key, value: Value) {
        self.shard(&key).write().insert(key, value);
    }

    /// Groups keys by shard first so each touched shard is read-locked once,
    /// no matter how many of the batch's keys it owns.
    fn batch_get(&self, keys: &[Key]) -> Vec<Value> {
        let mut grouped: HashMap<usize, Vec<usize>> = HashMap::new();
        for (index, key) in keys.iter().enumerate() {
            grouped.entry(self.shard_of(key)).or_default().push(index);
        }

        let mut values = vec![Value::new(); keys.len()];
        for (shard_index, indices) in grouped {
            let shard = self.shards[shard_index].read();
            for index in indices {
                if let Some(value) = shard.get(&keys[index]) {
                    values[index] = value.clone();
                }
            }
        }
        values
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }
}
