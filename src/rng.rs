//! Deterministic sampling used by the Angle Matcher's working-set cap (§4.1 step 3).
//!
//! The teacher crate seeds `rand::rngs::StdRng` directly, but `StdRng`'s algorithm is only
//! guaranteed to be stable within a single `rand` release series, not across them. Since this
//! engine's contract is "fixed seed + fixed inputs ⇒ identical output" indefinitely, sampling is
//! built on `rand_chacha::ChaCha8Rng`, whose output stream is part of its documented, versioned
//! API surface.

use rand::seq::index::sample;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// A seeded sampler used to bound the Angle Matcher's working set.
pub(crate) struct Sampler {
    rng: ChaCha8Rng,
}

impl Sampler {
    /// Creates a sampler seeded from the run's configured `random_seed`.
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Chooses `k` indices out of `0..n` uniformly without replacement, in ascending order.
    /// If `k >= n`, returns all of `0..n`.
    pub(crate) fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        if k >= n {
            return (0..n).collect();
        }
        let mut indices: Vec<usize> = sample(&mut self.rng, n, k).into_vec();
        indices.sort_unstable();
        indices
    }
}
