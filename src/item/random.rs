//! Seeded random source stored as a scope item.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fmt;

/// A seeded [`StdRng`] that can live in a scope variable.
///
/// Operators draw from it through
/// [`ExecutionContext::with_random`](crate::operator::ExecutionContext::with_random).
/// Cloning copies the generator state, so a cloned paused run draws the same
/// numbers as the original would have.
///
/// Equality compares the seed and the number of draws taken.
#[derive(Clone)]
pub struct RandomSource {
    seed: u64,
    draws: u64,
    rng: StdRng,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            draws: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeds from the thread-local generator.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of `next_*`/`fill_bytes` calls served so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Restarts the stream from the original seed.
    pub fn reset(&mut self) {
        *self = Self::new(self.seed);
    }
}

impl RngCore for RandomSource {
    fn next_u32(&mut self) -> u32 {
        self.draws += 1;
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws += 1;
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        self.draws += 1;
        self.rng.fill_bytes(dst)
    }
}

impl PartialEq for RandomSource {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed && self.draws == other.draws
    }
}

impl fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomSource")
            .field("seed", &self.seed)
            .field("draws", &self.draws)
            .finish()
    }
}
