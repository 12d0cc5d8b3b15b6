//! Bloom pre-filter for fast definite-negative hints
//!
//! Stores rule-filter fingerprints; a `false` from
//! [`BloomFilter::possibly_contains`] is definitive, a `true` is advisory.
//! The classifier consults it as a hint only and never short-circuits on it.
//! Removal is not supported (no counting variant); stale bits after a rule
//! is deleted are accepted as advisory noise.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

/// Minimum bit-array size
const MIN_BITS: u64 = 100;
/// Maximum number of hash functions
const MAX_HASHES: u32 = 16;
/// Seed separating the second base hash from the first
const SECOND_HASH_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// A standard (non-counting) Bloom filter over byte strings
///
/// Two independent 64-bit base hashes are combined with the
/// Kirsch-Mitzenmacher scheme `h_i = h1 + i * (h2 + i + 1) mod m` to derive
/// the `k` probe positions.
///
/// # Examples
///
/// ```
/// use rust_classifier::index::BloomFilter;
///
/// let mut filter = BloomFilter::from_rate(1000, 0.01);
/// filter.insert(b"fingerprint");
///
/// assert!(filter.possibly_contains(b"fingerprint"));
/// // A false return is definitive
/// if !filter.possibly_contains(b"never inserted") {
///     // definitely absent
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    insertions: u64,
}

impl BloomFilter {
    /// Size the filter for `expected_items` insertions at the desired
    /// false-positive rate
    ///
    /// Computes `m = ceil(-n * ln(p) / ln(2)^2)` bits and
    /// `k = ceil((m / n) * ln(2))` hash functions, clamped to `m >= 100` and
    /// `k` in `1..=16`. Out-of-range inputs are clamped rather than
    /// rejected; callers that care validate upstream (see
    /// `ClassifierConfig::validate`).
    #[must_use]
    pub fn from_rate(expected_items: u64, fp_rate: f64) -> Self {
        let n = expected_items.max(1);
        let p = fp_rate.clamp(1e-9, 0.999_999);
        let ln2 = std::f64::consts::LN_2;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let m = (-(n as f64) * p.ln() / (ln2 * ln2)).ceil() as u64;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let k = ((m as f64 / n as f64) * ln2).ceil() as u32;
        Self::with_params(m, k)
    }

    /// Create a filter with an explicit bit-array size and hash count
    ///
    /// Both parameters are clamped to the supported ranges (`m >= 100`,
    /// `k` in `1..=16`).
    #[must_use]
    pub fn with_params(num_bits: u64, num_hashes: u32) -> Self {
        let num_bits = num_bits.max(MIN_BITS);
        let num_hashes = num_hashes.clamp(1, MAX_HASHES);
        let words = usize::try_from((num_bits + 63) / 64).unwrap_or(usize::MAX);
        Self {
            bits: vec![0u64; words],
            num_bits,
            num_hashes,
            insertions: 0,
        }
    }

    /// Bit-array size in bits
    #[must_use]
    pub const fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of hash functions
    #[must_use]
    pub const fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Number of insertions performed
    #[must_use]
    pub const fn insertions(&self) -> u64 {
        self.insertions
    }

    /// Add an item to the filter
    pub fn insert(&mut self, data: &[u8]) {
        let (h1, h2) = hash_pair(data);
        for i in 0..self.num_hashes {
            let idx = self.probe_index(h1, h2, i);
            self.bits[idx / 64] |= 1u64 << (idx % 64);
        }
        self.insertions += 1;
    }

    /// Check whether an item might be in the set
    ///
    /// `false` means the item was definitely never inserted; `true` means it
    /// was possibly inserted (subject to the false-positive rate).
    #[must_use]
    pub fn possibly_contains(&self, data: &[u8]) -> bool {
        let (h1, h2) = hash_pair(data);
        for i in 0..self.num_hashes {
            let idx = self.probe_index(h1, h2, i);
            if self.bits[idx / 64] & (1u64 << (idx % 64)) == 0 {
                return false;
            }
        }
        true
    }

    /// The false-positive probability implied by the current fill level
    ///
    /// Uses the standard approximation `(1 - e^(-k*n/m))^k`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    pub fn effective_fp_rate(&self) -> f64 {
        let kn_over_m =
            (f64::from(self.num_hashes) * self.insertions as f64) / self.num_bits as f64;
        (1.0 - (-kn_over_m).exp()).powi(self.num_hashes as i32)
    }

    /// Estimate the number of distinct items inserted from the number of set
    /// bits: `n* = -(m / k) * ln(1 - X / m)`
    ///
    /// Returns `u64::MAX` when the filter is saturated (every bit set), at
    /// which point the estimate is unbounded.
    #[must_use]
    pub fn approximate_count(&self) -> u64 {
        let set_bits: u64 = self.bits.iter().map(|w| u64::from(w.count_ones())).sum();
        if set_bits == 0 {
            return 0;
        }
        if set_bits >= self.num_bits {
            return u64::MAX;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let estimate = (-(self.num_bits as f64 / f64::from(self.num_hashes))
            * (1.0 - set_bits as f64 / self.num_bits as f64).ln())
        .round() as u64;
        estimate
    }

    /// Kirsch-Mitzenmacher probe position for hash function `i`
    #[allow(clippy::cast_possible_truncation)]
    fn probe_index(&self, h1: u64, h2: u64, i: u32) -> usize {
        let i = u64::from(i);
        let combined = h1.wrapping_add(i.wrapping_mul(h2.wrapping_add(i).wrapping_add(1)));
        (combined % self.num_bits) as usize
    }
}

/// Two independent 64-bit hashes of the input bytes
///
/// The second hash mixes a fixed seed ahead of the data so the two base
/// hashes are genuinely distinct functions, not permutations of one value.
fn hash_pair(data: &[u8]) -> (u64, u64) {
    let mut first = DefaultHasher::new();
    first.write(data);
    let h1 = first.finish();

    let mut second = DefaultHasher::new();
    second.write_u64(SECOND_HASH_SEED);
    second.write(data);
    let h2 = second.finish();

    (h1, h2)
}
