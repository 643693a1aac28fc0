use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("RPC error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("Invalid host address: {0}")]
    InvalidUri(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Response size mismatch: sent {sent} keys, got {received} values")]
    BatchMismatch { sent: usize, received: usize },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Reflection service error: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
}
