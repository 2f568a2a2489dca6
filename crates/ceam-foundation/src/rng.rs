//! Stateless, index-addressed random draws.
//!
//! CEAM's randomness system is built on common random numbers: for a given
//! decision point (a *key*) every simulant must see the same uniform draw in
//! every simulation that shares a seed, no matter which components ask or in
//! what order, and no matter what subset of the population is being asked
//! about. Variance between counterfactual scenarios then reflects the
//! intervention, not sampling noise.
//!
//! A stateful generator cannot provide that, so draws here are a pure
//! function of `(seed, draw_index)`: the key is hashed to a seed, and each
//! simulant's draw index selects one value from the virtual sequence that
//! seed defines. SplitMix64 mixing gives fast, high-quality, portable output.
//!
//! ```
//! use ceam_foundation::{draw_f64, fnv1a64_str};
//!
//! let seed = fnv1a64_str("ihd_incidence_2005-01-01_None_0");
//! let a = draw_f64(seed, 17);
//! let b = draw_f64(seed, 17);
//! assert_eq!(a, b);
//! ```

use std::f64::consts::PI;

/// Random u64 for a given seed and draw index.
///
/// Pure function: identical inputs always produce identical output.
#[inline]
pub fn draw_u64(seed: u64, index: u64) -> u64 {
    // Walk the SplitMix64 sequence to the index'th state, then mix.
    let state = seed.wrapping_add((index.wrapping_add(1)).wrapping_mul(0x9E3779B97F4A7C15));
    splitmix64_mix(state)
}

/// Uniform random f64 in [0, 1) for a given seed and draw index.
#[inline]
pub fn draw_f64(seed: u64, index: u64) -> f64 {
    u64_to_f64_01(draw_u64(seed, index))
}

/// Standard normal deviate for a given seed and draw index.
///
/// Box-Muller over two independent uniforms taken from disjoint index
/// subspaces, so normal and uniform draws at the same index do not collide.
#[inline]
pub fn normal_from_draws(seed: u64, index: u64) -> f64 {
    let u1 = draw_f64(seed ^ 0xA5A5A5A5A5A5A5A5, index);
    let u2 = draw_f64(seed ^ 0x5A5A5A5A5A5A5A5A, index);
    let u1 = if u1 == 0.0 { f64::MIN_POSITIVE } else { u1 };
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// SplitMix64 mixing function.
#[inline]
const fn splitmix64_mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Convert a u64 to a uniform f64 in [0, 1) using the upper 53 bits.
#[inline]
const fn u64_to_f64_01(x: u64) -> f64 {
    (x >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}
