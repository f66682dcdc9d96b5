// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Spreading vector generation for STDM embedding.
//!
//! Generates unit-norm pseudo-random spreading vectors from a ChaCha20 PRNG
//! seeded by the structural key. Each vector maps one message bit to a group
//! of L DCT coefficients.

use rand::Rng;
use rand_chacha::ChaCha20Rng;
use rand::SeedableRng;

/// Number of DCT coefficients per embedding unit (spreading vector length).
pub const SPREAD_LEN: usize = 8;

/// Generate `count` spreading vectors of length `SPREAD_LEN` from a seed.
///
/// Each vector is drawn from a standard normal distribution (via Box-Muller)
/// and then normalized to unit length. This ensures the projection operation
/// in STDM is well-conditioned.
pub fn generate_spreading_vectors(seed: &[u8; 32], count: usize) -> Vec<[f64; SPREAD_LEN]> {
    let mut rng = ChaCha20Rng::from_seed(*seed);
    let mut vectors = Vec::with_capacity(count);

    for _ in 0..count {
        let mut v = [0.0f64; SPREAD_LEN];

        // Generate random values and normalize
        for val in v.iter_mut() {
            // Uniform random in [-1, 1], then normalize afterward
            *val = rng.gen_range(-1.0..1.0);
        }

        // Normalize to unit length
        // sqrt() is IEEE 754 correctly-rounded â€” deterministic across all platforms
        let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 1e-10 {
            for val in v.iter_mut() {
                *val /= norm;
            }
        } else {
            // Extremely unlikely, but set first element to 1
            v[0] = 1.0;
        }

        vectors.push(v);
    }

    vectors
}
