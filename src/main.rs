use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use clap::Parser;
use key_value::{Operation, encode_key};
use stats::{OpCounters, spawn_reporter};
use store::{BackendKind, DEFAULT_SHARD_COUNT, KvBackend, Store, StoreBuilder};
use tracing_subscriber::EnvFilter;
use workload::{Workload, WorkloadConfig, WorkloadKind};

/// Ops a worker runs between counter flushes and stop checks.
const WORKER_BATCH: u64 = 1024;

#[derive(Parser)]
#[command(author, version, about = "In-process store benchmark, no RPC", long_about = None)]
struct Args {
    #[arg(long, default_value_t = BackendKind::Sharded)]
    backend: BackendKind,

    #[arg(long, default_value_t = 8)]
    threads: usize,

    #[arg(long, default_value_t = 10)]
    secs: u64,

    #[arg(long, default_value_t = WorkloadKind::YcsbB)]
    workload: WorkloadKind,

    #[arg(long, default_value_t = 0.99)]
    theta: f64,

    #[arg(long, default_value_t = 100_000)]
    keys: u64,

    #[arg(long, default_value_t = DEFAULT_SHARD_COUNT)]
    shards: usize,

    #[arg(long)]
    cache_capacity: Option<usize>,

    /// Writes every key once before the clock starts.
    #[arg(long)]
    preload: bool,
}

fn run_worker(store: &Store, mut workload: Workload, counters: &OpCounters, stop: &AtomicBool) -> u64 {
    let mut done = 0;
    while !stop.load(Ordering::Relaxed) {
        let (mut gets, mut puts) = (0, 0);
        for _ in 0..WORKER_BATCH {
            match workload.next_operation() {
                op @ Operation::Get { .. } => {
                    store.get(&op.key());
                    gets += 1;
                }
                Operation::Put { key, value } => {
                    store.put(encode_key(key), value.to_vec());
                    puts += 1;
                }
            }
        }
        counters.record_gets(gets);
        counters.record_puts(puts);
        done += gets + puts;
    }
    done
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = WorkloadConfig {
        kind: args.workload,
        theta: args.theta,
        key_domain: args.keys,
        ..WorkloadConfig::default()
    };
    let template = Workload::new(&config)?;
    let store = Arc::new(
        StoreBuilder::default()
            .backend(args.backend)
            .shard_count(args.shards)
            .cache_capacity(args.cache_capacity)
            .build()?,
    );

    if args.preload {
        let start_preload = Instant::now();
        let value = vec![b'x'; config.value_len];
        for id in 0..args.keys {
            store.put(encode_key(id), value.clone());
        }
        println!("Preloaded {} keys in {:?}", args.keys, start_preload.elapsed());
    }

    let counters = Arc::new(OpCounters::default());
    let stop = Arc::new(AtomicBool::new(false));
    let reporter = spawn_reporter(counters.clone(), Duration::from_secs(1), "bench", stop.clone());

    let started = Instant::now();
    let workers: Vec<_> = (0..args.threads)
        .map(|i| {
            let store = store.clone();
            let counters = counters.clone();
            let stop = stop.clone();
            let workload = template.fork(Workload::stream_seed(config.seed, i));
            tokio::task::spawn_blocking(move || run_worker(&store, workload, &counters, &stop))
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(args.secs)).await;
    stop.store(true, Ordering::Relaxed);

    let mut total = 0;
    for worker in workers {
        total += worker.await?;
    }
    let elapsed = started.elapsed();
    let _ = reporter.await;

    println!(
        "{} / {} / {} threads: {} ops in {:?} ({:.0} ops/sec, {} keys stored)",
        args.backend,
        args.workload,
        args.threads,
        total,
        elapsed,
        total as f64 / elapsed.as_secs_f64(),
        store.len()
    );
    Ok(())
}
