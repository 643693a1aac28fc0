use rand::Rng;

use crate::error::WorkloadError;

/// Zipfian ranks over `[0, items)` following Gray et al., "Quickly Generating
/// Billion-Record Synthetic Databases". Rank 0 is the hottest key.
#[derive(Debug, Clone)]
pub struct Zipfian {
    items: u64,
    theta: f64,
    alpha: f64,
    zetan: f64,
    eta: f64,
    half_pow_theta: f64,
}

impl Zipfian {
    pub fn new(items: u64, theta: f64) -> Result<Self, WorkloadError> {
        if items == 0 {
            return Err(WorkloadError::EmptyKeyDomain);
        }
        if !(0.0..1.0).contains(&theta) {
            return Err(WorkloadError::InvalidTheta(theta));
        }

        let zetan = zeta(items, theta);
        let zeta2 = zeta(2, theta);
        let eta = (1.0 - (2.0 / items as f64).powf(1.0 - theta)) / (1.0 - zeta2 / zetan);

        Ok(Self {
            items,
            theta,
            alpha: 1.0 / (1.0 - theta),
            zetan,
            eta,
            half_pow_theta: 0.5f64.powf(theta),
        })
    }

    pub fn items(&self) -> u64 {
        self.items
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        self.rank_for(rng.gen_range(0.0..1.0))
    }

    /// Inverts the CDF for a uniform draw `u` in `[0, 1)`.
    pub fn rank_for(&self, u: f64) -> u64 {
        let uz = u * self.zetan;
        if uz < 1.0 {
            return 0;
        }
        if uz < 1.0 + self.half_pow_theta {
            return 1.min(self.items - 1);
        }

        let rank = self.items as f64 * (self.eta * u - self.eta + 1.0).powf(self.alpha);
        (rank as u64).min(self.items - 1)
    }

    /// Exact probability mass of `rank`.
    pub fn probability(&self, rank: u64) -> f64 {
        if rank >= self.items {
            return 0.0;
        }
        1.0 / ((rank + 1) as f64).powf(self.theta) / self.zetan
    }
}

// generalized harmonic number H(n, theta)
fn zeta(n: u64, theta: f64) -> f64 {
    (1..=n).map(|i| 1.0 / (i as f64).powf(theta)).sum()
}
