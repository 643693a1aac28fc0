pub mod error;
pub mod history;
pub mod pipeline;
pub mod pool;
pub mod service;
pub mod summary;
pub mod transport;

pub mod shardkv {
    tonic::include_proto!("shardkv");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("shardkv_descriptor");
}

pub use error::ClientError;
pub use pipeline::{ExecutionMode, Pipeline, PipelineConfig, PipelineReport};
pub use pool::ConnectionPool;
pub use service::KvStoreService;
pub use summary::RunSummary;
pub use transport::{KvTransport, LocalTransport};
