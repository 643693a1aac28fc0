use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{OpCounters, StatsSnapshot};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Rates {
    pub gets_per_sec: f64,
    pub puts_per_sec: f64,
    pub ops_per_sec: f64,
}

/// Turns successive snapshots into per-second rates. The only state it
/// mutates is its own baseline.
#[derive(Debug)]
pub struct RateTracker {
    previous: StatsSnapshot,
    last: Instant,
}

impl RateTracker {
    pub fn new(baseline: StatsSnapshot, now: Instant) -> Self {
        Self {
            previous: baseline,
            last: now,
        }
    }

    pub fn tick(&mut self, current: StatsSnapshot, now: Instant) -> Rates {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        let delta = current.delta(&self.previous);
        self.previous = current;
        self.last = now;

        if elapsed <= 0.0 {
            return Rates::default();
        }
        Rates {
            gets_per_sec: delta.gets as f64 / elapsed,
            puts_per_sec: delta.puts as f64 / elapsed,
            ops_per_sec: delta.ops() as f64 / elapsed,
        }
    }
}

/// Logs get/put/op rates every `interval` until `stop` is raised.
pub fn spawn_reporter(
    counters: Arc<OpCounters>,
    interval: Duration,
    label: &'static str,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        let mut tracker = RateTracker::new(counters.snapshot(), Instant::now());

        while !stop.load(Ordering::Relaxed) {
            ticker.tick().await;
            let rates = tracker.tick(counters.snapshot(), Instant::now());
            tracing::info!(
                target: "stats",
                label,
                gets_per_sec = rates.gets_per_sec.round(),
                puts_per_sec = rates.puts_per_sec.round(),
                ops_per_sec = rates.ops_per_sec.round(),
                "throughput"
            );
        }
    })
}
