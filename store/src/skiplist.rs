use crossbeam_skiplist::SkipMap;
use key_value::{Key, Value};
use lru::LruCache;

use crate::{KvBackend, ReadCache};

/// Lock-free ordered map, optionally fronted by a [`ReadCache`].
#[derive(Debug)]
pub struct SkipListMap {
    inner: SkipMap<Key, Value>,
    cache: Option<ReadCache>,
}

impl SkipListMap {
    pub fn new(cache: Option<ReadCache>) -> Self {
        SkipListMap {
            inner: SkipMap::new(),
            cache,
        }
    }

    pub fn cache(&self) -> Option<&ReadCache> {
        self.cache.as_ref()
    }

    fn read_map(&self, key: &[u8]) -> Option<Value> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    /// Cache hit, or a map read filled into the cache. The caller holds the
    /// cache lock across the map read so a racing put cannot slip between our
    /// read and our fill; puts invalidate only after their insert.
    fn read_locked(&self, lru: &mut LruCache<Key, Value>, key: &[u8]) -> Value {
        if let Some(value) = lru.get(key) {
            return value.clone();
        }
        match self.read_map(key) {
            Some(value) => {
                lru.put(key.to_vec(), value.clone());
                value
            }
            None => Value::new(),
        }
    }
}

impl KvBackend for SkipListMap {
    fn get(&self, key: &[u8]) -> Value {
        match &self.cache {
            Some(cache) => self.read_locked(&mut cache.lock(), key),
            None => self.read_map(key).unwrap_or_default(),
        }
    }

    fn put(&self, key: Key, value: Value) {
        match &self.cache {
            Some(cache) => {
                let stale = key.clone();
                self.inner.insert(key, value);
                cache.invalidate(&stale);
            }
            None => {
                self.inner.insert(key, value);
            }
        }
    }

    fn batch_get(&self, keys: &[Key]) -> Vec<Value> {
        match &self.cache {
            Some(cache) => {
                let mut lru = cache.lock();
                keys.iter().map(|key| self.read_locked(&mut lru, key)).collect()
            }
            None => keys
                .iter()
                .map(|key| self.read_map(key).unwrap_or_default())
                .collect(),
        }
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
