use std::{fmt, str::FromStr};

use crate::error::StoreError;
use crate::{DataStructure, ReadCache, ShardedMap, SingleLockMap, SkipListMap, Store};

pub const DEFAULT_SHARD_COUNT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    SingleLock,
    Sharded,
    SkipList,
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" | "single-lock" => Ok(BackendKind::SingleLock),
            "sharded" => Ok(BackendKind::Sharded),
            "skiplist" | "lock-free" => Ok(BackendKind::SkipList),
            _ => Err(StoreError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::SingleLock => "single",
            BackendKind::Sharded => "sharded",
            BackendKind::SkipList => "skiplist",
        };
        f.write_str(name)
    }
}

pub struct StoreBuilder {
    backend: BackendKind,
    shard_count: usize,
    cache_capacity: Option<usize>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sharded,
            shard_count: DEFAULT_SHARD_COUNT,
            cache_capacity: None,
        }
    }
}

impl StoreBuilder {
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Only consulted by the sharded backend.
    pub fn shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Only consulted by the skiplist backend; `None` disables the read cache.
    pub fn cache_capacity(mut self, cache_capacity: Option<usize>) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    pub fn build(self) -> Result<Store, StoreError> {
        let inner = match self.backend {
            BackendKind::SingleLock => DataStructure::SingleLock(SingleLockMap::new()),
            BackendKind::Sharded => DataStructure::Sharded(ShardedMap::new(self.shard_count)?),
            BackendKind::SkipList => {
                let cache = self.cache_capacity.map(ReadCache::new).transpose()?;
                DataStructure::SkipList(SkipListMap::new(cache))
            }
        };
        log::info!(
            "built {} store (shards: {}, cache: {:?})",
            self.backend,
            self.shard_count,
            self.cache_capacity
        );
        Ok(Store { inner })
    }
}
