use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use shardkv_server::{KvStoreService, service};
use stats::{DEFAULT_COUNTER_SHARDS, OpCounters, spawn_reporter};
use store::{BackendKind, DEFAULT_SHARD_COUNT, StoreBuilder};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Sharded in-memory key-value gRPC server", long_about = None)]
struct Args {
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// single | sharded | skiplist
    #[arg(long, default_value_t = BackendKind::Sharded)]
    backend: BackendKind,

    #[arg(long, default_value_t = DEFAULT_SHARD_COUNT)]
    shards: usize,

    /// Enables the LRU read cache in front of the skiplist backend.
    #[arg(long)]
    cache_capacity: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_COUNTER_SHARDS)]
    counter_shards: usize,

    #[arg(long, default_value_t = 1000)]
    report_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let store = StoreBuilder::default()
        .backend(args.backend)
        .shard_count(args.shards)
        .cache_capacity(args.cache_capacity)
        .build()?;
    let counters = Arc::new(OpCounters::new(args.counter_shards)?);
    let service = KvStoreService::new(Arc::new(store), counters.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;

    let stop = Arc::new(AtomicBool::new(false));
    let reporter = spawn_reporter(
        counters,
        Duration::from_millis(args.report_interval_ms),
        "server",
        stop.clone(),
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    };
    let served = service::serve(listener, service, shutdown).await;

    stop.store(true, Ordering::Relaxed);
    let _ = reporter.await;
    served?;

    Ok(())
}
