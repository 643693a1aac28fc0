//! Operation counters and throughput reporting shared by the server and the
//! load generator.

mod counters;
mod reporter;

pub use counters::{DEFAULT_COUNTER_SHARDS, OpCounters, StatsError, StatsSnapshot};
pub use reporter::{RateTracker, Rates, spawn_reporter};
