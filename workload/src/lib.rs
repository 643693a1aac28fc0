//! YCSB-style operation streams with Zipfian key skew.

mod error;
pub mod zipfian;

use std::{fmt, str::FromStr, sync::Arc};

use key_value::Operation;
use rand::{Rng, SeedableRng, rngs::StdRng};

pub use error::WorkloadError;
pub use zipfian::Zipfian;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkloadKind {
    /// 50% reads
    YcsbA,
    /// 95% reads
    #[default]
    YcsbB,
    /// read only
    YcsbC,
}

impl WorkloadKind {
    pub fn read_ratio(&self) -> f64 {
        match self {
            WorkloadKind::YcsbA => 0.5,
            WorkloadKind::YcsbB => 0.95,
            WorkloadKind::YcsbC => 1.0,
        }
    }
}

impl FromStr for WorkloadKind {
    type Err = WorkloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YCSB-A" | "A" => Ok(WorkloadKind::YcsbA),
            "YCSB-B" | "B" => Ok(WorkloadKind::YcsbB),
            "YCSB-C" | "C" => Ok(WorkloadKind::YcsbC),
            _ => Err(WorkloadError::UnknownWorkload(s.to_string())),
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkloadKind::YcsbA => "YCSB-A",
            WorkloadKind::YcsbB => "YCSB-B",
            WorkloadKind::YcsbC => "YCSB-C",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub kind: WorkloadKind,
    pub theta: f64,
    pub key_domain: u64,
    pub value_len: usize,
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            kind: WorkloadKind::YcsbB,
            theta: 0.99,
            key_domain: 100_000,
            value_len: 128,
            seed: 0,
        }
    }
}

/// An endless, seeded stream of operations. Two workloads built from the same
/// config and seed yield identical sequences.
#[derive(Debug, Clone)]
pub struct Workload {
    kind: WorkloadKind,
    keys: Zipfian,
    value: Arc<[u8]>,
    rng: StdRng,
}

impl Workload {
    pub fn new(config: &WorkloadConfig) -> Result<Self, WorkloadError> {
        let keys = Zipfian::new(config.key_domain, config.theta)?;
        let value: Arc<[u8]> = vec![b'x'; config.value_len].into();

        Ok(Self {
            kind: config.kind,
            keys,
            value,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Reuses the precomputed key distribution with a fresh generator. Building
    /// the zeta constants is linear in the key domain, so clients fork one
    /// template instead of each paying for it.
    /// Seed for the `index`th stream forked from a run seeded with `base`.
    /// Wraps at `u64::MAX`.
    pub fn stream_seed(base: u64, index: usize) -> u64 {
        base.wrapping_add(index as u64)
    }

    pub fn fork(&self, seed: u64) -> Self {
        Self {
            kind: self.kind,
            keys: self.keys.clone(),
            value: self.value.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    pub fn key_distribution(&self) -> &Zipfian {
        &self.keys
    }

    pub fn next_operation(&mut self) -> Operation {
        let is_read = self.rng.gen_bool(self.kind.read_ratio());
        let key = self.keys.sample(&mut self.rng);
        if is_read {
            Operation::Get { key }
        } else {
            Operation::Put {
                key,
                value: self.value.clone(),
            }
        }
    }
}

impl Iterator for Workload {
    type Item = Operation;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_operation())
    }
}
