//! Seeded random-variate source with reproducible per-patient streams.
//!
//! Every patient owns a private stream derived from the master seed and the
//! patient index, so identical seed + identical index always reproduce the
//! same visit history regardless of how patients are scheduled across
//! worker threads.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Normal;

/// SplitMix64 finalizer, used to decorrelate neighbouring patient indices
/// before seeding the per-patient generator.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// A reproducible stream of stochastic draws for a single patient
#[derive(Debug, Clone)]
pub struct PatientRng {
    rng: StdRng,
}

impl PatientRng {
    /// Create the stream for a given patient index under a master seed
    #[must_use]
    pub fn for_patient(master_seed: u64, patient_index: usize) -> Self {
        let seed = splitmix64(master_seed ^ splitmix64(patient_index as u64));
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create a stream directly from a raw seed (test fixtures)
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in [0, 1)
    pub fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Uniform draw in [lo, hi)
    pub fn uniform_range(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.rng.random_range(lo..hi)
    }

    /// Gaussian draw; a non-positive standard deviation collapses to the mean
    pub fn gaussian(&mut self, mean: f64, sd: f64) -> f64 {
        if sd <= 0.0 {
            return mean;
        }
        // Normal::new only fails on a non-finite or negative sd, which the
        // guard above excludes.
        let dist = Normal::new(mean, sd).unwrap_or(Normal::new(mean, f64::MIN_POSITIVE).unwrap());
        self.rng.sample(dist)
    }

    /// Bernoulli draw; p outside [0, 1] is clamped
    pub fn bernoulli(&mut self, p: f64) -> bool {
        let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
        self.rng.random_bool(p)
    }
}
