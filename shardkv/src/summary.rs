use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;

use crate::pipeline::{ExecutionMode, Pipeline, PipelineReport};
use crate::transport::KvTransport;

/// End-of-run totals across every client pipeline.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: ExecutionMode,
    pub clients: Vec<PipelineReport>,
    pub failed_clients: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(mode: ExecutionMode, elapsed: Duration) -> Self {
        Self {
            mode,
            clients: Vec::new(),
            failed_clients: 0,
            elapsed,
        }
    }

    pub fn record(&mut self, report: PipelineReport) {
        self.clients.push(report);
    }

    pub fn record_failure(&mut self) {
        self.failed_clients += 1;
    }

    pub fn total_ops(&self) -> u64 {
        self.clients.iter().map(|r| r.completed).sum()
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_ops() as f64 / secs
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(f, "Mode:             {}", self.mode)?;
        writeln!(
            f,
            "Clients:          {} finished / {} failed",
            self.clients.len(),
            self.failed_clients
        )?;
        writeln!(f, "Elapsed:          {:.2}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Operations:       {}", self.total_ops())?;
        write!(f, "Throughput:       {:.0} ops/sec", self.throughput())
    }
}

/// Starts every pipeline, lets them run for `duration`, then raises `stop`
/// and joins them. Pipelines must be fully connected beforehand: the clock
/// starts immediately before the first one is spawned.
pub async fn run_clients<T: KvTransport>(
    pipelines: Vec<Pipeline<T>>,
    mode: ExecutionMode,
    duration: Duration,
    stop: Arc<AtomicBool>,
) -> RunSummary {
    let started = Instant::now();
    let handles: Vec<_> = pipelines
        .into_iter()
        .map(|pipeline| tokio::spawn(pipeline.run()))
        .collect();

    tokio::time::sleep(duration).await;
    stop.store(true, Ordering::Relaxed);

    let mut joined = Vec::with_capacity(handles.len());
    for handle in handles {
        joined.push(handle.await);
    }
    let mut summary = RunSummary::new(mode, started.elapsed());
    for result in joined {
        match result {
            Ok(Ok(report)) => summary.record(report),
            Ok(Err(e)) => {
                tracing::error!("client failed: {}", e);
                summary.record_failure();
            }
            Err(e) => {
                tracing::error!("client task panicked: {}", e);
                summary.record_failure();
            }
        }
    }
    summary
}
