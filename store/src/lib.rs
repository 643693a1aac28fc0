//! In-memory key-value storage behind three interchangeable concurrency
//! strategies. The backend is fixed when the [`Store`] is built.

pub mod builder;
mod cache;
pub mod error;
pub mod sharded;
mod single_lock;
mod skiplist;

use key_value::{Key, Value};

pub use builder::{BackendKind, DEFAULT_SHARD_COUNT, StoreBuilder};
pub use cache::ReadCache;
pub use error::StoreError;
pub use sharded::ShardedMap;
pub use single_lock::SingleLockMap;
pub use skiplist::SkipListMap;

/// Shared-reference storage capability. Implementations synchronize
/// internally so a single instance can serve every connection.
///
/// A missing key reads back as an empty value; callers cannot tell it apart
/// from a stored empty value.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> Value;
    fn put(&self, key: Key, value: Value);
    /// Index aligned with `keys`.
    fn batch_get(&self, keys: &[Key]) -> Vec<Value>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub enum DataStructure {
    SingleLock(SingleLockMap),
    Sharded(ShardedMap),
    SkipList(SkipListMap),
}

#[derive(Debug)]
pub struct Store {
    inner: DataStructure,
}

impl Store {
    pub fn kind(&self) -> BackendKind {
        match &self.inner {
            DataStructure::SingleLock(_) => BackendKind::SingleLock,
            DataStructure::Sharded(_) => BackendKind::Sharded,
            DataStructure::SkipList(_) => BackendKind::SkipList,
        }
    }
}

impl KvBackend for Store {
    fn get(&self, key: &[u8]) -> Value {
        match &self.inner {
            DataStructure::SingleLock(map) => map.get(key),
            DataStructure::Sharded(map) => map.get(key),
            DataStructure::SkipList(map) => map.get(key),
        }
    }

    fn put(&self, key: Key, value: Value) {
        match &self.inner {
            DataStructure::SingleLock(map) => map.put(key, value),
            DataStructure::Sharded(map) => map.put(key, value),
            DataStructure::SkipList(map) => map.put(key, value),
        }
    }

    fn batch_get(&self, keys: &[Key]) -> Vec<Value> {
        match &self.inner {
            DataStructure::SingleLock(map) => map.batch_get(keys),
            DataStructure::Sharded(map) => map.batch_get(keys),
            DataStructure::SkipList(map) => map.batch_get(keys),
        }
    }

    fn len(&self) -> usize {
        match &self.inner {
            DataStructure::SingleLock(map) => map.len(),
            DataStructure::Sharded(map) => map.len(),
            DataStructure::SkipList(map) => map.len(),
        }
    }
}
