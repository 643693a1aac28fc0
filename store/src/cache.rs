use std::num::NonZeroUsize;

use key_value::{Key, Value};
use lru::LruCache;
use parking_lot::{Mutex, MutexGuard};

use crate::error::StoreError;

/// Bounded LRU front for the read path. Never the source of truth: entries
/// are filled on read misses and dropped by every write to the same key.
#[derive(Debug)]
pub struct ReadCache {
    inner: Mutex<LruCache<Key, Value>>,
    #[cfg(test)]
    read_locks: std::sync::atomic::AtomicUsize,
}

impl ReadCache {
    pub fn new(capacity: usize) -> Result<Self, StoreError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(StoreError::InvalidCacheCapacity)?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(capacity)),
            #[cfg(test)]
            read_locks: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn invalidate(&self, key: &[u8]) {
        self.inner.lock().pop(key);
    }

    /// Read-path lock. Writers go through [`ReadCache::invalidate`].
    pub(crate) fn lock(&self) -> MutexGuard<'_, LruCache<Key, Value>> {
        #[cfg(test)]
        self.read_locks
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.inner.lock()
    }

    #[cfg(test)]
    pub(crate) fn read_locks(&self) -> usize {
        self.read_locks.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            ReadCache::new(0).unwrap_err(),
            StoreError::InvalidCacheCapacity
        );
    }

    #[test]
    fn test_evicts_least_recently_used() -> Result<(), StoreError> {
        let cache = ReadCache::new(2)?;
        {
            let mut lru = cache.lock();
            lru.put(b"a".to_vec(), b"1".to_vec());
            lru.put(b"b".to_vec(), b"2".to_vec());
            lru.get(&b"a"[..]);
            lru.put(b"c".to_vec(), b"3".to_vec());
        }
        assert!(cache.contains(b"a"));
        assert!(!cache.contains(b"b"));
        assert!(cache.contains(b"c"));
        assert_eq!(cache.len(), cache.capacity());

        cache.invalidate(b"a");
        assert!(!cache.contains(b"a"));
        Ok(())
    }
}
