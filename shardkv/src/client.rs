use std::{
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

use clap::Parser;
use shardkv_server::{
    ClientError, ConnectionPool, ExecutionMode, Pipeline, PipelineConfig, history::HistoryLog,
    summary::run_clients,
};
use stats::{OpCounters, spawn_reporter};
use tracing_subscriber::EnvFilter;
use workload::{Workload, WorkloadConfig, WorkloadKind};

#[derive(Parser)]
#[command(author, version, about = "Closed-loop YCSB load generator for shardkv", long_about = None)]
struct Args {
    /// Comma separated host:port list; keys are routed by id modulo host count.
    #[arg(long, value_delimiter = ',', default_value = "localhost:8080")]
    hosts: Vec<String>,

    #[arg(long, default_value_t = 0.99)]
    theta: f64,

    /// YCSB-A | YCSB-B | YCSB-C
    #[arg(long, default_value_t = WorkloadKind::YcsbB)]
    workload: WorkloadKind,

    #[arg(long, default_value_t = 30)]
    secs: u64,

    #[arg(long, default_value_t = 64)]
    clients: usize,

    #[arg(long, default_value_t = 1024)]
    batch: usize,

    /// Connections opened per host by each client.
    #[arg(long, default_value_t = 4)]
    connections: usize,

    /// sync | batched | pipelined | fire-and-forget
    #[arg(long, default_value_t = ExecutionMode::Pipelined)]
    mode: ExecutionMode,

    /// Shorthand for `--mode fire-and-forget`.
    #[arg(long)]
    fire_and_forget: bool,

    #[arg(long, default_value_t = 100_000)]
    keys: u64,

    #[arg(long, default_value_t = 128)]
    value_len: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Writes one JSON line per completed operation.
    #[arg(long)]
    history: Option<PathBuf>,

    #[arg(long, default_value_t = 1000)]
    report_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mode = if args.fire_and_forget {
        ExecutionMode::FireAndForget
    } else {
        args.mode
    };
    let hosts: Vec<String> = args
        .hosts
        .iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();
    if hosts.is_empty() {
        return Err(ClientError::InvalidConfig("no hosts given".to_string()).into());
    }

    // zeta is computed once and shared by every fork
    let template = Workload::new(&WorkloadConfig {
        kind: args.workload,
        theta: args.theta,
        key_domain: args.keys,
        value_len: args.value_len,
        seed: args.seed,
    })?;

    let history = match &args.history {
        Some(path) => match HistoryLog::create(path).await {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::warn!("history disabled, cannot open {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    tracing::info!(
        workload = %args.workload,
        %mode,
        clients = args.clients,
        hosts = hosts.len(),
        "connecting"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let counters = Arc::new(OpCounters::default());
    let mut pipelines = Vec::with_capacity(args.clients);
    for client_id in 0..args.clients {
        let pool = ConnectionPool::connect(&hosts, args.connections).await?;
        let mut pipeline = Pipeline::new(
            PipelineConfig {
                client_id,
                mode,
                batch_size: args.batch,
            },
            template.fork(Workload::stream_seed(args.seed, client_id)),
            pool,
            stop.clone(),
        )?
        .with_counters(counters.clone());
        if let Some((log, _)) = &history {
            pipeline = pipeline.with_history(log.clone());
        }
        pipelines.push(pipeline);
    }

    let reporter = spawn_reporter(
        counters,
        Duration::from_millis(args.report_interval_ms),
        "client",
        stop.clone(),
    );
    let summary = run_clients(pipelines, mode, Duration::from_secs(args.secs), stop).await;
    let _ = reporter.await;

    if let Some((log, writer)) = history {
        drop(log);
        match writer.finish().await {
            Ok(written) => tracing::info!("wrote {} history entries", written),
            Err(e) => tracing::warn!("history incomplete: {}", e),
        }
    }

    println!("\n{}", summary);
    Ok(())
}
