//! Per-client load loop: pulls operations from a [`Workload`] and drives them
//! through a [`ConnectionPool`] in one of four execution modes.

use std::{
    fmt,
    mem,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use key_value::{Key, Operation, Value, encode_key};
use stats::OpCounters;
use tokio::task::JoinSet;
use tonic::Status;
use workload::Workload;

use crate::error::ClientError;
use crate::history::{HistoryEntry, HistoryLog, now_nanos};
use crate::pool::ConnectionPool;
use crate::transport::KvTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One call at a time, each awaited before the next.
    Sync,
    /// Reads buffered per host and sent as one BatchGet; writes flush first.
    Batched,
    /// Windows of `batch_size` concurrent calls, each window awaited in full.
    #[default]
    Pipelined,
    /// Calls are issued and never awaited.
    FireAndForget,
}

impl FromStr for ExecutionMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(ExecutionMode::Sync),
            "batched" => Ok(ExecutionMode::Batched),
            "pipelined" => Ok(ExecutionMode::Pipelined),
            "fire-and-forget" | "fire_and_forget" => Ok(ExecutionMode::FireAndForget),
            _ => Err(ClientError::InvalidConfig(format!(
                "unknown execution mode: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Batched => "batched",
            ExecutionMode::Pipelined => "pipelined",
            ExecutionMode::FireAndForget => "fire-and-forget",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub client_id: usize,
    pub mode: ExecutionMode,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub client_id: usize,
    pub completed: u64,
}

/// A finished call, timestamped for the history log.
struct Completed {
    op: Operation,
    output: Option<Value>,
    start_nanos: i64,
    end_nanos: i64,
}

async fn execute<T: KvTransport>(conn: &mut T, op: Operation) -> Result<Completed, Status> {
    let start_nanos = now_nanos();
    let output = match &op {
        Operation::Get { key } => Some(conn.get(encode_key(*key)).await?),
        Operation::Put { key, value } => {
            conn.put(encode_key(*key), value.to_vec()).await?;
            None
        }
    };
    Ok(Completed {
        op,
        output,
        start_nanos,
        end_nanos: now_nanos(),
    })
}

pub struct Pipeline<T> {
    config: PipelineConfig,
    workload: Workload,
    pool: ConnectionPool<T>,
    stop: Arc<AtomicBool>,
    counters: Option<Arc<OpCounters>>,
    history: Option<HistoryLog>,
    completed: u64,
}

impl<T: KvTransport> Pipeline<T> {
    pub fn new(
        config: PipelineConfig,
        workload: Workload,
        pool: ConnectionPool<T>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, ClientError> {
        if config.batch_size == 0 {
            return Err(ClientError::InvalidConfig(
                "batch size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            config,
            workload,
            pool,
            stop,
            counters: None,
            history: None,
            completed: 0,
        })
    }

    /// Completed operations are also added to these shared counters.
    pub fn with_counters(mut self, counters: Arc<OpCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Ignored in fire-and-forget mode, which never sees replies.
    pub fn with_history(mut self, history: HistoryLog) -> Self {
        self.history = Some(history);
        self
    }

    /// Runs until the stop flag is observed at a batch boundary. The first
    /// RPC failure ends the pipeline; there is no retry.
    pub async fn run(mut self) -> Result<PipelineReport, ClientError> {
        tracing::debug!(
            client_id = self.config.client_id,
            mode = %self.config.mode,
            "pipeline starting"
        );
        match self.config.mode {
            ExecutionMode::Sync => self.run_sync().await?,
            ExecutionMode::Batched => self.run_batched().await?,
            ExecutionMode::Pipelined => self.run_pipelined().await?,
            ExecutionMode::FireAndForget => self.run_fire_and_forget().await,
        }

        let report = PipelineReport {
            client_id: self.config.client_id,
            completed: self.completed,
        };
        tracing::info!(
            client_id = report.client_id,
            completed = report.completed,
            "client finished"
        );
        Ok(report)
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn record(&mut self, gets: u64, puts: u64) {
        self.completed += gets + puts;
        if let Some(counters) = &self.counters {
            counters.record_gets(gets);
            counters.record_puts(puts);
        }
    }

    fn complete(&mut self, done: Completed) {
        if let Some(history) = &self.history {
            let client_id = self.config.client_id;
            let key = done.op.key();
            let entry = match (&done.op, &done.output) {
                (Operation::Put { value, .. }, _) => {
                    HistoryEntry::put(client_id, &key, value, done.start_nanos, done.end_nanos)
                }
                (Operation::Get { .. }, output) => HistoryEntry::get(
                    client_id,
                    &key,
                    output.as_deref().unwrap_or_default(),
                    done.start_nanos,
                    done.end_nanos,
                ),
            };
            history.log(entry);
        }
        if done.op.is_read() {
            self.record(1, 0);
        } else {
            self.record(0, 1);
        }
    }

    async fn run_sync(&mut self) -> Result<(), ClientError> {
        while !self.stopped() {
            let op = self.workload.next_operation();
            let host = self.pool.host_of(op.key_id());
            let done = execute(self.pool.next(host), op).await?;
            self.complete(done);
        }
        Ok(())
    }

    async fn run_batched(&mut self) -> Result<(), ClientError> {
        let mut pending: Vec<Vec<Key>> = vec![Vec::new(); self.pool.host_count()];

        while !self.stopped() {
            for _ in 0..self.config.batch_size {
                let op = self.workload.next_operation();
                let host = self.pool.host_of(op.key_id());
                match op {
                    Operation::Get { key } => {
                        pending[host].push(encode_key(key));
                        if pending[host].len() >= self.config.batch_size {
                            self.flush(host, &mut pending[host]).await?;
                        }
                    }
                    Operation::Put { .. } => {
                        // this client's earlier reads on the host go out first
                        self.flush(host, &mut pending[host]).await?;
                        let done = execute(self.pool.next(host), op).await?;
                        self.complete(done);
                    }
                }
            }
        }

        for (host, keys) in pending.iter_mut().enumerate() {
            self.flush(host, keys).await?;
        }
        Ok(())
    }

    async fn flush(&mut self, host: usize, pending: &mut Vec<Key>) -> Result<(), ClientError> {
        if pending.is_empty() {
            return Ok(());
        }
        let keys = mem::take(pending);
        let sent = keys.len();
        let logged_keys = self.history.is_some().then(|| keys.clone());

        let start_nanos = now_nanos();
        let values = self.pool.next(host).batch_get(keys).await?;
        let end_nanos = now_nanos();
        if values.len() != sent {
            return Err(ClientError::BatchMismatch {
                sent,
                received: values.len(),
            });
        }

        if let (Some(history), Some(keys)) = (&self.history, logged_keys) {
            for (key, value) in keys.iter().zip(values.iter()) {
                history.log(HistoryEntry::get(
                    self.config.client_id,
                    key,
                    value,
                    start_nanos,
                    end_nanos,
                ));
            }
        }
        self.record(sent as u64, 0);
        Ok(())
    }

    async fn run_pipelined(&mut self) -> Result<(), ClientError> {
        let mut window = JoinSet::new();

        while !self.stopped() {
            for _ in 0..self.config.batch_size {
                let op = self.workload.next_operation();
                let host = self.pool.host_of(op.key_id());
                let mut conn = self.pool.next(host).clone();
                window.spawn(async move { execute(&mut conn, op).await });
            }
            // the whole window lands before the next one is issued
            while let Some(joined) = window.join_next().await {
                let done = joined??;
                self.complete(done);
            }
        }
        Ok(())
    }

    async fn run_fire_and_forget(&mut self) {
        while !self.stopped() {
            let mut gets = 0;
            let mut puts = 0;
            for _ in 0..self.config.batch_size {
                let op = self.workload.next_operation();
                if op.is_read() {
                    gets += 1;
                } else {
                    puts += 1;
                }
                let host = self.pool.host_of(op.key_id());
                let mut conn = self.pool.next(host).clone();
                tokio::spawn(async move {
                    let _ = execute(&mut conn, op).await;
                });
            }
            self.record(gets, puts);
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Mutex, atomic::AtomicUsize},
        time::Duration,
    };

    use store::{BackendKind, StoreBuilder};
    use tempfile::tempdir;
    use workload::{WorkloadConfig, WorkloadKind};

    use super::*;
    use crate::history::OpType;
    use crate::service::KvStoreService;
    use crate::transport::LocalTransport;

    fn workload(kind: WorkloadKind, seed: u64) -> Workload {
        Workload::new(&WorkloadConfig {
            kind,
            theta: 0.99,
            key_domain: 1_000,
            value_len: 8,
            seed,
        })
        .expect("valid workload")
    }

    fn local_service() -> KvStoreService {
        let store = StoreBuilder::default()
            .backend(BackendKind::Sharded)
            .shard_count(16)
            .build()
            .expect("valid store");
        KvStoreService::new(Arc::new(store), Arc::new(OpCounters::default()))
    }

    fn local_pool(service: &KvStoreService, hosts: usize, per_host: usize) -> ConnectionPool<LocalTransport> {
        let conns = (0..hosts)
            .map(|_| {
                (0..per_host)
                    .map(|_| LocalTransport::new(service.clone()))
                    .collect()
            })
            .collect();
        ConnectionPool::new(conns).expect("non-empty pool")
    }

    async fn run_for(
        mode: ExecutionMode,
        service: &KvStoreService,
        client_counters: Arc<OpCounters>,
    ) -> Result<PipelineReport, ClientError> {
        let stop = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline::new(
            PipelineConfig {
                client_id: 0,
                mode,
                batch_size: 32,
            },
            workload(WorkloadKind::YcsbA, 1),
            local_pool(service, 2, 3),
            stop.clone(),
        )?
        .with_counters(client_counters);

        let handle = tokio::spawn(pipeline.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.store(true, Ordering::Relaxed);
        handle.await?
    }

    #[test]
    fn test_parse_execution_mode() {
        assert_eq!("sync".parse::<ExecutionMode>().ok(), Some(ExecutionMode::Sync));
        assert_eq!(
            "Fire-And-Forget".parse::<ExecutionMode>().ok(),
            Some(ExecutionMode::FireAndForget)
        );
        assert!("warp".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::Pipelined.to_string(), "pipelined");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let service = local_service();
        let result = Pipeline::new(
            PipelineConfig {
                client_id: 0,
                mode: ExecutionMode::Batched,
                batch_size: 0,
            },
            workload(WorkloadKind::YcsbB, 0),
            local_pool(&service, 1, 1),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_completed_counts_match_server_counters() -> Result<(), ClientError> {
        for mode in [
            ExecutionMode::Sync,
            ExecutionMode::Batched,
            ExecutionMode::Pipelined,
        ] {
            let service = local_service();
            let client_counters = Arc::new(OpCounters::default());
            let report = run_for(mode, &service, client_counters.clone()).await?;

            assert!(report.completed > 0, "{} completed nothing", mode);
            assert_eq!(service.counters().snapshot().ops(), report.completed, "{}", mode);
            assert_eq!(client_counters.snapshot().ops(), report.completed, "{}", mode);
        }
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fire_and_forget_counts_issued_calls() -> Result<(), ClientError> {
        let service = local_service();
        let client_counters = Arc::new(OpCounters::default());
        let report = run_for(ExecutionMode::FireAndForget, &service, client_counters.clone()).await?;

        assert!(report.completed > 0);
        assert_eq!(report.completed % 32, 0);
        assert_eq!(client_counters.snapshot().ops(), report.completed);
        // detached calls keep landing after the loop exits
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while service.counters().snapshot().ops() < report.completed {
            assert!(tokio::time::Instant::now() < deadline, "calls went missing");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(service.counters().snapshot().ops(), report.completed);
        Ok(())
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Get(Key),
        Put(Key),
        BatchGet(Vec<Key>),
    }

    /// Logs every call per host and raises the stop flag after `limit` calls.
    #[derive(Debug, Clone)]
    struct Recording {
        host: usize,
        calls: Arc<Mutex<Vec<(usize, Call)>>>,
        stop: Arc<AtomicBool>,
        limit: usize,
    }

    impl Recording {
        fn push(&self, call: Call) {
            let mut calls = self.calls.lock().expect("poisoned");
            calls.push((self.host, call));
            if calls.len() >= self.limit {
                self.stop.store(true, Ordering::Relaxed);
            }
        }
    }

    #[tonic::async_trait]
    impl KvTransport for Recording {
        async fn get(&mut self, key: Key) -> Result<Value, Status> {
            self.push(Call::Get(key));
            Ok(Value::new())
        }

        async fn put(&mut self, key: Key, _value: Value) -> Result<(), Status> {
            self.push(Call::Put(key));
            Ok(())
        }

        async fn batch_get(&mut self, keys: Vec<Key>) -> Result<Vec<Value>, Status> {
            let values = vec![Value::new(); keys.len()];
            self.push(Call::BatchGet(keys));
            Ok(values)
        }
    }

    fn recording_pool(
        hosts: usize,
        calls: &Arc<Mutex<Vec<(usize, Call)>>>,
        stop: &Arc<AtomicBool>,
        limit: usize,
    ) -> ConnectionPool<Recording> {
        let conns = (0..hosts)
            .map(|host| {
                vec![Recording {
                    host,
                    calls: calls.clone(),
                    stop: stop.clone(),
                    limit,
                }]
            })
            .collect();
        ConnectionPool::new(conns).expect("non-empty pool")
    }

    #[tokio::test]
    async fn test_batched_reads_flush_before_write_on_same_host() -> Result<(), ClientError> {
        let hosts = 2;
        let batch_size = 8;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline::new(
            PipelineConfig {
                client_id: 0,
                mode: ExecutionMode::Batched,
                batch_size,
            },
            workload(WorkloadKind::YcsbA, 9),
            recording_pool(hosts, &calls, &stop, 200),
            stop.clone(),
        )?;
        let report = pipeline.run().await?;

        let calls = calls.lock().expect("poisoned").clone();
        let mut issued: u64 = 0;
        for host in 0..hosts {
            // flatten what reached this host, in arrival order
            let mut seen = Vec::new();
            for (_, call) in calls.iter().filter(|(h, _)| *h == host) {
                match call {
                    Call::BatchGet(keys) => {
                        assert!(!keys.is_empty() && keys.len() <= batch_size);
                        seen.extend(keys.iter().map(|k| (true, k.clone())));
                    }
                    Call::Put(key) => seen.push((false, key.clone())),
                    Call::Get(_) => panic!("batched mode never sends single gets"),
                }
            }
            issued += seen.len() as u64;

            // same host's slice of the generated stream, in program order
            let expected: Vec<(bool, Key)> = workload(WorkloadKind::YcsbA, 9)
                .filter(|op| (op.key_id() % hosts as u64) as usize == host)
                .take(seen.len())
                .map(|op| (op.is_read(), op.key()))
                .collect();
            assert_eq!(seen, expected, "host {}", host);
        }
        assert_eq!(issued, report.completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_mode_follows_generated_order() -> Result<(), ClientError> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline::new(
            PipelineConfig {
                client_id: 0,
                mode: ExecutionMode::Sync,
                batch_size: 1,
            },
            workload(WorkloadKind::YcsbB, 4),
            recording_pool(1, &calls, &stop, 50),
            stop.clone(),
        )?;
        let report = pipeline.run().await?;
        assert_eq!(report.completed, 50);

        let calls = calls.lock().expect("poisoned").clone();
        let expected: Vec<Call> = workload(WorkloadKind::YcsbB, 4)
            .take(50)
            .map(|op| match op {
                Operation::Get { .. } => Call::Get(op.key()),
                Operation::Put { .. } => Call::Put(op.key()),
            })
            .collect();
        let seen: Vec<Call> = calls.into_iter().map(|(_, call)| call).collect();
        assert_eq!(seen, expected);
        Ok(())
    }

    /// Slow connection that tracks how many calls are in flight across all
    /// clones, and which connection served each call.
    #[derive(Debug, Clone)]
    struct Gauge {
        id: usize,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        served_by: Arc<Mutex<Vec<usize>>>,
        stop: Arc<AtomicBool>,
        limit: usize,
    }

    impl Gauge {
        async fn serve(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            {
                let mut served_by = self.served_by.lock().expect("poisoned");
                served_by.push(self.id);
                if served_by.len() >= self.limit {
                    self.stop.store(true, Ordering::Relaxed);
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tonic::async_trait]
    impl KvTransport for Gauge {
        async fn get(&mut self, _key: Key) -> Result<Value, Status> {
            self.serve().await;
            Ok(Value::new())
        }

        async fn put(&mut self, _key: Key, _value: Value) -> Result<(), Status> {
            self.serve().await;
            Ok(())
        }

        async fn batch_get(&mut self, keys: Vec<Key>) -> Result<Vec<Value>, Status> {
            self.serve().await;
            Ok(vec![Value::new(); keys.len()])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pipelined_window_is_bounded_and_spread_over_connections() -> Result<(), ClientError> {
        let batch_size = 16;
        let connections = 4;
        let windows = 3;
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let served_by = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let conns = (0..connections)
            .map(|id| Gauge {
                id,
                in_flight: in_flight.clone(),
                peak: peak.clone(),
                served_by: served_by.clone(),
                stop: stop.clone(),
                limit: batch_size * windows,
            })
            .collect();
        let pipeline = Pipeline::new(
            PipelineConfig {
                client_id: 0,
                mode: ExecutionMode::Pipelined,
                batch_size,
            },
            workload(WorkloadKind::YcsbA, 5),
            ConnectionPool::new(vec![conns])?,
            stop.clone(),
        )?;
        let report = pipeline.run().await?;

        assert_eq!(report.completed, (batch_size * windows) as u64);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= batch_size, "peak {} over window {}", peak, batch_size);
        assert!(peak > 1, "window calls never overlapped");

        // windows never overlap, so each run of batch_size calls is one window
        let served_by = served_by.lock().expect("poisoned").clone();
        for window in served_by.chunks(batch_size) {
            for id in 0..connections {
                let used = window.iter().filter(|&&conn| conn == id).count();
                assert_eq!(used, batch_size / connections, "connection {}", id);
            }
        }
        Ok(())
    }

    #[derive(Debug, Clone)]
    struct Unavailable;

    #[tonic::async_trait]
    impl KvTransport for Unavailable {
        async fn get(&mut self, _key: Key) -> Result<Value, Status> {
            Err(Status::unavailable("connection reset"))
        }

        async fn put(&mut self, _key: Key, _value: Value) -> Result<(), Status> {
            Err(Status::unavailable("connection reset"))
        }

        async fn batch_get(&mut self, _keys: Vec<Key>) -> Result<Vec<Value>, Status> {
            Err(Status::unavailable("connection reset"))
        }
    }

    #[tokio::test]
    async fn test_rpc_error_ends_the_pipeline() {
        for mode in [
            ExecutionMode::Sync,
            ExecutionMode::Batched,
            ExecutionMode::Pipelined,
        ] {
            let pipeline = Pipeline::new(
                PipelineConfig {
                    client_id: 1,
                    mode,
                    batch_size: 4,
                },
                workload(WorkloadKind::YcsbA, 2),
                ConnectionPool::new(vec![vec![Unavailable]]).expect("non-empty pool"),
                Arc::new(AtomicBool::new(false)),
            )
            .expect("valid pipeline");
            let result = pipeline.run().await;
            assert!(matches!(result, Err(ClientError::Rpc(_))), "{}", mode);
        }
    }

    #[tokio::test]
    async fn test_pre_raised_stop_issues_nothing() -> Result<(), ClientError> {
        let service = local_service();
        let pipeline = Pipeline::new(
            PipelineConfig {
                client_id: 0,
                mode: ExecutionMode::Pipelined,
                batch_size: 16,
            },
            workload(WorkloadKind::YcsbB, 0),
            local_pool(&service, 1, 1),
            Arc::new(AtomicBool::new(true)),
        )?;
        assert_eq!(pipeline.run().await?.completed, 0);
        assert_eq!(service.counters().snapshot().ops(), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_history_records_every_completed_operation() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("history.jsonl");
        let (history, writer) = HistoryLog::create(&path).await?;

        let service = local_service();
        let stop = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline::new(
            PipelineConfig {
                client_id: 7,
                mode: ExecutionMode::Batched,
                batch_size: 4,
            },
            workload(WorkloadKind::YcsbA, 3),
            local_pool(&service, 1, 1),
            stop.clone(),
        )?
        .with_history(history);

        let handle = tokio::spawn(pipeline.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.store(true, Ordering::Relaxed);
        let report = handle.await??;

        assert_eq!(writer.finish().await?, report.completed);

        let contents = tokio::fs::read_to_string(&path).await?;
        for line in contents.lines() {
            let entry: HistoryEntry = serde_json::from_str(line)?;
            assert_eq!(entry.client_id, 7);
            assert!(entry.start_nanos <= entry.end_nanos);
            match entry.op_type {
                OpType::Get => assert!(entry.input_value.is_none()),
                OpType::Put => assert_eq!(entry.input_value.as_deref(), Some("xxxxxxxx")),
            }
        }
        Ok(())
    }
}
