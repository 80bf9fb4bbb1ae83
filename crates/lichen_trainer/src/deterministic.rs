//! Deterministic utilities for reproducible training
//!
//! Provides an LCG-based RNG, a seeded row hash and split tie-breaking so a
//! fixed seed reproduces the same split, search draws and trees.

use std::cmp::Ordering;
use std::num::Wrapping;

/// Linear Congruential Generator for deterministic pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    // LCG constants (compatible with glibc)
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: u64) -> Self {
        Self {
            state: Wrapping((seed % Self::MODULUS as u64) as i64),
        }
    }

    /// Independent generator for sub-task `stream` (a tree, a fold, a family)
    pub fn derive(seed: u64, stream: u64) -> Self {
        let mixed = xxhash64(&stream.to_le_bytes(), seed);
        Self::new(mixed)
    }

    /// Generate next random i64 in range [0, MODULUS)
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        (self.state.0 & (Self::MODULUS - 1)).abs()
    }

    /// Generate random value in range [0, max)
    /// from the high bits of the draw
    pub fn next_range(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        ((self.next_i64() as u128 * max as u128) >> 31) as usize
    }

    /// Fisher-Yates shuffle
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_range(i + 1);
            items.swap(i, j);
        }
    }

    /// `k` distinct indices from `0..n`, in draw order
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        let k = k.min(n);
        let mut pool: Vec<usize> = (0..n).collect();
        for i in 0..k {
            let j = i + self.next_range(n - i);
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }

    /// `k` indices from `0..n` drawn with replacement
    pub fn sample_with_replacement(&mut self, n: usize, k: usize) -> Vec<usize> {
        (0..k).map(|_| self.next_range(n)).collect()
    }
}

/// Deterministic xxhash64-like hash over bytes
pub fn xxhash64(data: &[u8], seed: u64) -> u64 {
    const PRIME1: u64 = 0x9E3779B185EBCA87;
    const PRIME2: u64 = 0xC2B2AE3D27D4EB4F;
    const PRIME3: u64 = 0x165667B19E3779F9;
    const PRIME5: u64 = 0x85EBCA77C2B2AE63;

    let mut h = seed.wrapping_add(PRIME5);

    for &byte in data {
        h = h.wrapping_add((byte as u64).wrapping_mul(PRIME3));
        h = h.rotate_left(17).wrapping_mul(PRIME2);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;

    h
}

/// Uniform value in [0.0, 1.0) derived from a record key and seed
pub fn unit_hash(key: &str, seed: u64) -> f64 {
    (xxhash64(key.as_bytes(), seed) >> 11) as f64 / (1u64 << 53) as f64
}

/// Deterministic tie-breaker for split selection
/// Lower feature index wins, then lower threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold: f64,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold: f64) -> Self {
        Self {
            feature_idx,
            threshold,
        }
    }

    pub fn precedes(&self, other: &Self) -> bool {
        self.feature_idx
            .cmp(&other.feature_idx)
            .then(self.threshold.total_cmp(&other.threshold))
            == Ordering::Less
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_lcg_range() {
        let mut rng = LcgRng::new(42);
        for _ in 0..100 {
            let val = rng.next_range(10);
            assert!(val < 10);
        }
    }

    #[test]
    fn test_sample_indices_distinct() {
        let mut rng = LcgRng::new(7);
        let mut drawn = rng.sample_indices(20, 8);
        assert_eq!(drawn.len(), 8);
        drawn.sort_unstable();
        drawn.dedup();
        assert_eq!(drawn.len(), 8);
        assert!(drawn.iter().all(|&i| i < 20));

        assert_eq!(rng.sample_indices(3, 10).len(), 3);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = LcgRng::new(1);
        let mut items: Vec<usize> = (0..50).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_derived_streams_differ() {
        let mut a = LcgRng::derive(42, 0);
        let mut b = LcgRng::derive(42, 1);
        let draws_a: Vec<i64> = (0..5).map(|_| a.next_i64()).collect();
        let draws_b: Vec<i64> = (0..5).map(|_| b.next_i64()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn test_xxhash64_different_seeds() {
        let data = b"record-17";
        assert_eq!(xxhash64(data, 42), xxhash64(data, 42));
        assert_ne!(xxhash64(data, 42), xxhash64(data, 43));
    }

    #[test]
    fn test_unit_hash_range() {
        for i in 0..100 {
            let u = unit_hash(&format!("id{i}"), 42);
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 1.5);
        let t2 = SplitTieBreaker::new(0, 2.5);
        let t3 = SplitTieBreaker::new(1, 0.5);

        assert!(t1.precedes(&t2));
        assert!(t1.precedes(&t3));
        assert!(!t3.precedes(&t2));
    }
}
