use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WorkloadError {
    #[error("Invalid zipfian skew: {0}. Must satisfy 0 <= theta < 1")]
    InvalidTheta(f64),

    #[error("Key domain must contain at least one key")]
    EmptyKeyDomain,

    #[error("Unknown workload type: {0}")]
    UnknownWorkload(String),
}
