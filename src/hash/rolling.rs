// Rolling fingerprint over a sliding sample of bytes.
//
// The fingerprint of the last SAMPLE_SIZE bytes is built incrementally:
//
//     h' = (h << 1) + byte + e
//
// where `e` is a saturating count of immediately-preceding identical bytes.
// Each step shifts older contributions one bit up, so after SAMPLE_SIZE
// steps a byte has left the 64-bit key entirely: two identical samples
// anywhere in any stream yield the same fingerprint.
//
// The `e` bias de-equalizes long monotone runs. Without it, a run of
// identical bytes collapses to a fixed point of the recurrence and every
// window inside the run hashes alike; with it, windows stay distinguishable
// for up to 2 × SAMPLE_SIZE bytes into a run.

/// Fingerprint key type.
pub type Fingerprint = u64;

/// Bytes covered by one fingerprint — the bit width of the key, since the
/// recurrence shifts one bit per byte.
pub const SAMPLE_SIZE: usize = 64;

/// Bytes needed to initialize the fingerprint at the start of a stream.
pub const WARMUP_FRESH: usize = SAMPLE_SIZE - 1;

/// Worst-case bytes needed to reinitialize mid-stream: one full sample to
/// settle the equal-run counter and another to fill the key.
pub const WARMUP_RESTART: usize = 2 * SAMPLE_SIZE - 1;

/// Incremental fingerprint state.
#[derive(Debug, Clone)]
pub struct RollingHash {
    hash: Fingerprint,
    prev: Option<u8>,
    equal_run: usize,
}

impl Default for RollingHash {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingHash {
    pub fn new() -> Self {
        Self {
            hash: 0,
            prev: None,
            equal_run: 0,
        }
    }

    /// Forget all state, as if at a stream start.
    pub fn reset(&mut self) {
        self.hash = 0;
        self.prev = None;
        self.equal_run = 0;
    }

    /// Absorb one byte and return the updated fingerprint.
    #[inline]
    pub fn update(&mut self, byte: u8) -> Fingerprint {
        if self.prev == Some(byte) {
            if self.equal_run < SAMPLE_SIZE {
                self.equal_run += 1;
            }
        } else {
            self.prev = Some(byte);
            self.equal_run = 0;
        }
        self.hash = self
            .hash
            .wrapping_shl(1)
            .wrapping_add(byte as u64 + self.equal_run as u64);
        self.hash
    }

    /// Current fingerprint.
    #[inline]
    pub fn value(&self) -> Fingerprint {
        self.hash
    }

    /// Current saturating equal-run counter.
    ///
    /// Doubles as a sample-quality signal for the index (long runs make poor
    /// samples) and as the warmup-shortening signal: while reinitializing
    /// mid-stream, the counter equals the byte index until the first byte
    /// change resets it, after which the state is trustworthy.
    #[inline]
    pub fn equal_run(&self) -> usize {
        self.equal_run
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(data: &[u8]) -> Fingerprint {
        let mut h = RollingHash::new();
        let mut last = 0;
        for &b in data {
            last = h.update(b);
        }
        last
    }

    #[test]
    fn identical_windows_hash_alike() {
        // Two occurrences of the same SAMPLE_SIZE window, different history.
        let window: Vec<u8> = (0..SAMPLE_SIZE).map(|i| (i * 7 + 3) as u8).collect();

        let mut a = Vec::new();
        a.extend_from_slice(b"some prefix");
        a.extend_from_slice(&window);

        let mut b = Vec::new();
        b.extend_from_slice(b"a completely different and longer prefix here");
        b.extend_from_slice(&window);

        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn equal_run_state_carries_into_window() {
        // Identical windows preceded by runs long enough to saturate the
        // equal-run counter enter the window with the same state and must
        // hash alike, whatever the exact run lengths were.
        let window = vec![9u8; SAMPLE_SIZE];
        let mut b = vec![9u8; 200];
        b.extend_from_slice(&window);
        let mut c = vec![9u8; SAMPLE_SIZE + 10];
        c.extend_from_slice(&window);
        assert_eq!(hash_of(&b), hash_of(&c));
    }

    #[test]
    fn long_runs_stay_distinguishable() {
        // Consecutive windows inside a run of one byte must produce
        // different fingerprints for at least SAMPLE_SIZE positions.
        let data = vec![0u8; 3 * SAMPLE_SIZE];
        let mut h = RollingHash::new();
        let mut seen = Vec::new();
        for &b in &data {
            seen.push(h.update(b));
        }
        let tail = &seen[SAMPLE_SIZE..2 * SAMPLE_SIZE];
        for i in 0..tail.len() {
            for j in i + 1..tail.len() {
                assert_ne!(tail[i], tail[j], "positions {i} and {j} collide");
            }
        }
    }

    #[test]
    fn equal_run_saturates() {
        let mut h = RollingHash::new();
        for _ in 0..3 * SAMPLE_SIZE {
            h.update(0xAB);
        }
        assert_eq!(h.equal_run(), SAMPLE_SIZE);
    }

    #[test]
    fn equal_run_resets_on_change() {
        let mut h = RollingHash::new();
        h.update(1);
        h.update(1);
        h.update(1);
        assert_eq!(h.equal_run(), 2);
        h.update(2);
        assert_eq!(h.equal_run(), 0);
    }

    #[test]
    fn reset_matches_fresh() {
        let mut h = RollingHash::new();
        h.update(5);
        h.update(6);
        h.reset();
        let mut f = RollingHash::new();
        assert_eq!(h.update(7), f.update(7));
    }
}
