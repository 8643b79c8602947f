// Position index: fingerprint → source position.
//
// A fixed-capacity open-addressed table sized to the largest prime fitting
// the requested byte budget. Collisions never chain; a counter-based
// override policy decides whether the incumbent or the newcomer wins, tuned
// so that surviving samples spread roughly uniformly over the indexed
// region however overloaded the table gets:
//   - every time the table has been offered a full load of samples, the
//     override threshold grows, spacing overwrites further apart;
//   - low-entropy samples (long equal runs) pay a smaller collision fee,
//     so they override less often.
//
// The reliability range grows with the overload: it estimates how many
// destination bytes must be inspected before concluding no match exists.
//
// Keys and positions live in two parallel arrays rather than one array of
// pairs; a struct would be padded to no benefit.

use super::largest_prime_at_most;
use super::rolling::{Fingerprint, SAMPLE_SIZE};
use std::collections::TryReserveError;

/// Bytes per index entry: an 8-byte key plus an 8-byte position.
pub const ENTRY_BYTES: usize = 16;

/// Base override threshold, added per table load.
const COLLISION_THRESHOLD: i32 = 4;
/// Collision fee paid by normal samples.
const COLLISION_HIGH: i32 = 4;
/// Collision fee paid by low-quality (long equal run) samples.
const COLLISION_LOW: i32 = 1;

/// Open-addressed fingerprint → position table.
pub struct HashIndex {
    keys: Vec<Fingerprint>,
    pos: Vec<i64>,
    prime: usize,

    /// Adds remaining before the next load boundary.
    load_count: usize,
    /// Current override threshold.
    col_max: i32,
    /// Collision budget until the next override.
    col_count: i32,
    /// Estimated bytes-to-inspect before giving up on a neighbourhood.
    reliability: i32,

    hits: u64,
}

impl HashIndex {
    /// Build an index not exceeding `capacity_bytes`.
    ///
    /// The slot count is the largest prime with `slots × ENTRY_BYTES ≤
    /// capacity_bytes` (minimum 2).
    pub fn with_capacity(capacity_bytes: usize) -> Result<Self, TryReserveError> {
        let prime = largest_prime_at_most(capacity_bytes / ENTRY_BYTES);

        let mut keys = Vec::new();
        keys.try_reserve_exact(prime)?;
        keys.resize(prime, 0);
        let mut pos = Vec::new();
        pos.try_reserve_exact(prime)?;
        pos.resize(prime, 0);

        Ok(Self {
            keys,
            pos,
            prime,
            load_count: prime,
            col_max: COLLISION_THRESHOLD,
            col_count: COLLISION_THRESHOLD,
            reliability: (SAMPLE_SIZE + SAMPLE_SIZE / 2) as i32,
            hits: 0,
        })
    }

    /// Offer a `(key, position)` sample to the index.
    ///
    /// `equal_run` is the sample's equal-run count; samples deep inside a
    /// monotone run are poor discriminators and win collisions less often.
    pub fn add(&mut self, key: Fingerprint, pos: i64, equal_run: usize) {
        // Each full table load widens the override spacing and the
        // reliability range.
        if self.load_count > 0 {
            self.load_count -= 1;
        } else {
            self.load_count = self.prime;
            self.col_max += COLLISION_THRESHOLD;
            self.reliability += 4;
        }

        if equal_run <= SAMPLE_SIZE * 2 {
            self.col_count -= COLLISION_HIGH;
        } else {
            self.col_count -= COLLISION_LOW;
        }

        if self.col_count <= 0 {
            let slot = (key % self.prime as u64) as usize;
            self.keys[slot] = key;
            self.pos[slot] = pos;
            self.col_count = self.col_max;
        }
    }

    /// Look a fingerprint up; `Some(position)` on a key match.
    #[inline]
    pub fn get(&mut self, key: Fingerprint) -> Option<i64> {
        let slot = (key % self.prime as u64) as usize;
        if self.keys[slot] == key {
            let p = self.pos[slot];
            // Position 0 with key 0 is the empty encoding; real entries
            // start at offset SAMPLE_SIZE − 1.
            if p != 0 || key != 0 {
                self.hits += 1;
                return Some(p);
            }
        }
        None
    }

    /// Consider the table empty again and restart the counters.
    pub fn reset(&mut self) {
        self.keys.fill(0);
        self.pos.fill(0);
        self.load_count = self.prime;
        self.col_max = COLLISION_THRESHOLD;
        self.col_count = COLLISION_THRESHOLD;
        self.reliability = (SAMPLE_SIZE + SAMPLE_SIZE / 2) as i32;
    }

    /// Current reliability range.
    #[inline]
    pub fn reliability(&self) -> i32 {
        self.reliability
    }

    /// Slot count (prime).
    pub fn slots(&self) -> usize {
        self.prime
    }

    /// Allocated size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.prime * ENTRY_BYTES
    }

    /// How many times the table has been (over)filled.
    pub fn overload(&self) -> i32 {
        self.col_max / COLLISION_THRESHOLD - 1
    }

    /// Number of lookup hits so far.
    pub fn hits(&self) -> u64 {
        self.hits
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn is_prime(n: usize) -> bool {
        if n < 2 {
            return false;
        }
        (2..).take_while(|i| i * i <= n).all(|i| n % i != 0)
    }

    #[test]
    fn capacity_is_largest_fitting_prime() {
        for &cap in &[1 << 10, 1 << 16, 1 << 20, 123_456] {
            let idx = HashIndex::with_capacity(cap).unwrap();
            let n = idx.slots();
            assert!(is_prime(n), "{n} not prime");
            assert!(n * ENTRY_BYTES <= cap);
            // No greater prime also fits.
            let mut m = n + 1;
            while m * ENTRY_BYTES <= cap {
                assert!(!is_prime(m), "prime {m} also fits in {cap}");
                m += 1;
            }
        }
    }

    #[test]
    fn add_then_get() {
        let mut idx = HashIndex::with_capacity(64 * 1024).unwrap();
        idx.add(0xDEAD_BEEF, 1234, 0);
        assert_eq!(idx.get(0xDEAD_BEEF), Some(1234));
        assert_eq!(idx.hits(), 1);
    }

    #[test]
    fn miss_on_key_mismatch() {
        let mut idx = HashIndex::with_capacity(64 * 1024).unwrap();
        let prime = idx.slots() as u64;
        idx.add(7, 100, 0);
        // Same slot, different key.
        assert_eq!(idx.get(7 + prime), None);
    }

    #[test]
    fn empty_slot_is_a_miss_for_key_zero() {
        let mut idx = HashIndex::with_capacity(4 * 1024).unwrap();
        assert_eq!(idx.get(0), None);
    }

    #[test]
    fn low_quality_samples_lose_collisions() {
        let mut idx = HashIndex::with_capacity(1024).unwrap();
        let prime = idx.slots() as u64;
        // Fill a slot with a good sample.
        idx.add(1, 10, 0);
        assert_eq!(idx.get(1), Some(10));
        // One colliding low-quality sample (fee 1) cannot displace it before
        // the threshold is spent; a good sample (fee 4) can.
        idx.add(1 + prime, 20, SAMPLE_SIZE * 2 + 1);
        assert_eq!(idx.get(1), Some(10));
        idx.add(1 + prime, 20, 0);
        assert_eq!(idx.get(1 + prime), Some(20));
    }

    #[test]
    fn reliability_grows_with_load() {
        let mut idx = HashIndex::with_capacity(1024).unwrap();
        let start = idx.reliability();
        assert_eq!(start, (SAMPLE_SIZE + SAMPLE_SIZE / 2) as i32);
        let n = idx.slots();
        for i in 0..(n as i64 * 3) {
            idx.add(i as u64, i + 1, 0);
        }
        assert!(idx.reliability() > start);
        assert!(idx.overload() >= 2);
    }

    #[test]
    fn reset_clears_entries() {
        let mut idx = HashIndex::with_capacity(4 * 1024).unwrap();
        idx.add(42, 99, 0);
        idx.reset();
        assert_eq!(idx.get(42), None);
        assert_eq!(idx.reliability(), (SAMPLE_SIZE + SAMPLE_SIZE / 2) as i32);
    }
}
