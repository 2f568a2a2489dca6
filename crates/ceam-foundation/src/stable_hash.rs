//! Portable, stable string hashing.
//!
//! Randomness keys are turned into seeds by hashing. `std::hash` makes no
//! stability guarantee across releases or processes, so we use FNV-1a with
//! fixed constants: the same key string must map to the same seed on every
//! platform and in every run, or common random numbers break.

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// FNV-1a hash of a byte slice.
#[inline]
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// FNV-1a hash of a string.
#[inline]
pub fn fnv1a64_str(s: &str) -> u64 {
    fnv1a64(s.as_bytes())
}
