//! Deterministic random streams
//!
//! Every attraction attempt draws from its own ChaCha stream seeded from
//! (master seed, yard, attempt), so a session replays exactly under a fixed
//! seed and yards never share randomness.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::model::YardId;

#[derive(Debug, Clone, Copy)]
pub struct RngManager {
    master_seed: u64,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self { master_seed: seed }
    }

    /// Seed pulled from the OS, for servers started without one.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn yard_rng(&self, yard: YardId, attempt: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.derive_seed(yard.raw(), attempt))
    }

    fn derive_seed(&self, yard: u64, attempt: u64) -> u64 {
        let mut seed = self.master_seed;
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= yard.wrapping_mul(48271);
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= attempt.wrapping_mul(69069);
        seed
    }
}
