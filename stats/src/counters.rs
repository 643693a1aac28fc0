use std::{
    cell::Cell,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use crossbeam_utils::CachePadded;
use thiserror::Error;

pub const DEFAULT_COUNTER_SHARDS: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("Invalid counter shard count: count must be greater than 0")]
    InvalidShardCount,
}

#[derive(Debug, Default)]
struct CounterShard {
    gets: AtomicU64,
    puts: AtomicU64,
}

/// Get/put totals split across padded slots so concurrent writers rarely
/// share a cache line. Each thread sticks to the slot it was dealt on first
/// use; readers sum every slot.
#[derive(Debug)]
pub struct OpCounters {
    shards: Box<[CachePadded<CounterShard>]>,
}

static NEXT_SLOT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static HOME_SLOT: Cell<Option<usize>> = const { Cell::new(None) };
}

fn home_slot() -> usize {
    HOME_SLOT.with(|slot| match slot.get() {
        Some(index) => index,
        None => {
            let index = NEXT_SLOT.fetch_add(1, Ordering::Relaxed);
            slot.set(Some(index));
            index
        }
    })
}

impl Default for OpCounters {
    fn default() -> Self {
        Self::with_shards(DEFAULT_COUNTER_SHARDS)
    }
}

impl OpCounters {
    pub fn new(shards: usize) -> Result<Self, StatsError> {
        if shards == 0 {
            return Err(StatsError::InvalidShardCount);
        }
        Ok(Self::with_shards(shards))
    }

    fn with_shards(shards: usize) -> Self {
        let shards = (0..shards)
            .map(|_| CachePadded::new(CounterShard::default()))
            .collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn slot(&self) -> &CounterShard {
        &self.shards[home_slot() % self.shards.len()]
    }

    pub fn record_gets(&self, count: u64) {
        if count > 0 {
            self.slot().gets.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_puts(&self, count: u64) {
        if count > 0 {
            self.slot().puts.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Read-only pass over every slot. Not a consistent cut while writers are
    /// active, but each total only ever grows.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.shards
            .iter()
            .fold(StatsSnapshot::default(), |acc, shard| StatsSnapshot {
                gets: acc.gets + shard.gets.load(Ordering::Relaxed),
                puts: acc.puts + shard.puts.load(Ordering::Relaxed),
            })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub gets: u64,
    pub puts: u64,
}

impl StatsSnapshot {
    pub fn ops(&self) -> u64 {
        self.gets + self.puts
    }

    pub fn delta(&self, previous: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets.saturating_sub(previous.gets),
            puts: self.puts.saturating_sub(previous.puts),
        }
    }
}
