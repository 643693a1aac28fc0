use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid shard count: count must be greater than 0")]
    InvalidShardCount,

    #[error("Invalid cache capacity: capacity must be greater than 0")]
    InvalidCacheCapacity,

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
}
