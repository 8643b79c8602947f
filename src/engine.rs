// Differ driver: compares the two streams byte by byte and calls in the
// lookahead search on divergence.
//
// The driver owns the position index and the match table. Per divergence:
//   1. search() reads ahead on the destination, querying the index for
//      every sample and feeding hits to the match table;
//   2. the best match yields (skip_org, skip_new, ahead): a DEL or BKT on
//      the source, INS bytes on the destination, then `ahead` bytes of
//      MOD/EQL until the cursors meet the solution;
//   3. equal bytes accumulate and flush as one EQL run.
//
// Source indexing runs as a full prescan by default, or incrementally
// alongside the compare cursor (and ahead of it during searches) when
// prescanning is off.

use std::collections::TryReserveError;
use std::io;

use crate::config;
use crate::hash::matching::{MatchOutcome, MatchTable};
use crate::hash::rolling::{RollingHash, SAMPLE_SIZE, WARMUP_FRESH, WARMUP_RESTART};
use crate::hash::table::HashIndex;
use crate::jdf::writer::PatchSink;
use crate::jdf::Op;
use crate::source::{ByteSource, Fetched, ReadMode, SourceError};

const S: i64 = SAMPLE_SIZE as i64;

// ---------------------------------------------------------------------------
// Options and stats
// ---------------------------------------------------------------------------

/// Differ configuration.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Position-index budget in bytes.
    pub index_size: usize,
    /// Match-table capacity in records.
    pub match_slots: usize,
    /// Matches to find before reads turn soft.
    pub match_min: usize,
    /// Matches after which a search stops.
    pub match_max: usize,
    /// Destination lookahead window in bytes (floored at 1024).
    pub ahead_max: i64,
    /// Allow BKT (backward source movement).
    pub backtrack: bool,
    /// Verify matches even when their data is outside the buffers.
    pub compare_all: bool,
    /// Index the whole source up front.
    pub prescan: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            index_size: config::DEFAULT_INDEX_SIZE,
            match_slots: config::DEFAULT_MATCH_SLOTS,
            match_min: config::DEFAULT_MATCH_MIN,
            match_max: config::DEFAULT_MATCH_MAX,
            ahead_max: config::DEFAULT_BUFFER_SIZE - config::DEFAULT_BLOCK_SIZE,
            backtrack: true,
            compare_all: true,
            prescan: true,
        }
    }
}

impl From<&config::Tuning> for DiffOptions {
    fn from(t: &config::Tuning) -> Self {
        Self {
            index_size: t.index_size,
            match_slots: t.match_slots,
            match_min: t.match_min,
            match_max: t.match_max,
            ahead_max: t.ahead,
            backtrack: t.backtrack,
            compare_all: t.compare_all,
            prescan: t.prescan,
        }
    }
}

/// Counters accumulated over one diff run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffStats {
    /// Solutions that did not materialize at the predicted position.
    pub inaccurate: u64,
    /// Index lookup hits.
    pub index_hits: u64,
    /// Index hits downgraded by byte comparison.
    pub index_repairs: u64,
    /// How many times the index has been overfilled.
    pub index_overload: i32,
    /// Final reliability range.
    pub reliability: i32,
}

/// Differ failure.
#[derive(Debug)]
pub enum DiffError {
    /// Reading one of the inputs failed.
    Source(SourceError),
    /// The patch sink failed.
    Sink(io::Error),
    /// An arena could not be allocated.
    Alloc(TryReserveError),
}

impl std::fmt::Display for DiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(e) => write!(f, "{e}"),
            Self::Sink(e) => write!(f, "patch output: {e}"),
            Self::Alloc(e) => write!(f, "allocation failed: {e}"),
        }
    }
}

impl std::error::Error for DiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            Self::Sink(e) => Some(e),
            Self::Alloc(e) => Some(e),
        }
    }
}

impl From<SourceError> for DiffError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

// ---------------------------------------------------------------------------
// Differ
// ---------------------------------------------------------------------------

/// Source indexing strategy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Full prescan still pending.
    Prescan,
    /// Full prescan done.
    Indexed,
    /// Index lazily, keeping pace with the compare cursor.
    Incremental,
}

/// One differ instance: index, match table and indexer state.
pub struct Differ {
    index: HashIndex,
    matches: MatchTable,

    scan: ScanState,
    backtrack: bool,
    match_min: usize,
    match_max: usize,
    ahead_max: i64,

    /// Incremental source indexer.
    hsh_org: RollingHash,
    /// Next source position to index.
    ahd_org: i64,

    /// Destination lookahead hash.
    hsh_new: RollingHash,
    /// Destination lookahead cursor (last hashed position).
    ahd_new: i64,

    /// Reliability range snapshot.
    rlb: i32,

    hash_miss: u64,
}

impl Differ {
    pub fn new(opts: &DiffOptions) -> Result<Self, TryReserveError> {
        Ok(Self {
            index: HashIndex::with_capacity(opts.index_size)?,
            matches: MatchTable::new(opts.match_slots, opts.compare_all)?,
            scan: if opts.prescan {
                ScanState::Prescan
            } else {
                ScanState::Incremental
            },
            backtrack: opts.backtrack,
            match_min: opts.match_min,
            match_max: opts.match_max,
            ahead_max: opts.ahead_max.max(config::MIN_AHEAD),
            hsh_org: RollingHash::new(),
            ahd_org: 0,
            hsh_new: RollingHash::new(),
            ahd_new: 0,
            rlb: 0,
            hash_miss: 0,
        })
    }

    /// Counters for reporting after a run.
    pub fn stats(&self) -> DiffStats {
        DiffStats {
            inaccurate: self.hash_miss,
            index_hits: self.index.hits(),
            index_repairs: self.matches.repairs(),
            index_overload: self.index.overload(),
            reliability: self.index.reliability(),
        }
    }

    /// Diff `org` against `new`, emitting operators into `out`.
    ///
    /// The caller owns the sink; its `data` counter afterwards tells
    /// whether any difference was found.
    pub fn diff<O, N, K>(&mut self, org: &mut O, new: &mut N, out: &mut K) -> Result<(), DiffError>
    where
        O: ByteSource + ?Sized,
        N: ByteSource + ?Sized,
        K: PatchSink,
    {
        let mut pos_org: i64 = 0;
        let mut pos_new: i64 = 0;
        let mut counting = false;
        let mut eql_count: i64 = 0;
        let mut found = false;
        let mut ahead: i64 = 0;
        let mut skip_org: i64 = 0;
        let mut skip_new: i64 = 0;

        let mut co = org.get(pos_org, ReadMode::Blocking)?;
        let mut cn = new.get(pos_new, ReadMode::Blocking)?;

        while let Fetched::Byte(bn) = cn {
            // Keep the incremental index abreast of the compare cursor.
            if self.scan == ScanState::Incremental && pos_org == self.ahd_org {
                if let Fetched::Byte(bo) = co {
                    let key = self.hsh_org.update(bo);
                    self.index.add(key, self.ahd_org, self.hsh_org.equal_run());
                    self.ahd_org += 1;
                }
            }

            match co {
                Fetched::Byte(bo) if bo == bn => {
                    if !counting {
                        // First equal bytes go through the sink until it
                        // commits to a run.
                        counting = out
                            .put(Op::Eql, 1, Some(bo), Some(bn), pos_org, pos_new)
                            .map_err(DiffError::Sink)?;
                        ahead -= 1;
                        pos_org += 1;
                        co = org.get(pos_org, ReadMode::Blocking)?;
                        pos_new += 1;
                        cn = new.get(pos_new, ReadMode::Blocking)?;
                    } else {
                        // Committed: count equals in a tight loop.
                        let mut run: i64 = 0;
                        loop {
                            match (co, cn) {
                                (Fetched::Byte(a), Fetched::Byte(b)) if a == b => {
                                    run += 1;
                                    if self.scan == ScanState::Incremental
                                        && pos_org == self.ahd_org
                                    {
                                        let key = self.hsh_org.update(a);
                                        self.index.add(
                                            key,
                                            self.ahd_org,
                                            self.hsh_org.equal_run(),
                                        );
                                        self.ahd_org += 1;
                                    }
                                    pos_org += 1;
                                    co = org.get(pos_org, ReadMode::Blocking)?;
                                    pos_new += 1;
                                    cn = new.get(pos_new, ReadMode::Blocking)?;
                                }
                                _ => break,
                            }
                        }
                        eql_count += run;
                        ahead -= run;
                    }
                }

                _ if ahead > 0 => {
                    // Inside a known solution's approach: spell out the
                    // differences.
                    flush_eql(out, pos_org, pos_new, &mut eql_count, &mut counting)?;

                    if let Fetched::Byte(_) = co {
                        loop {
                            let (a, b) = match (co, cn) {
                                (Fetched::Byte(a), Fetched::Byte(b)) => (a, b),
                                _ => break,
                            };
                            if a == b || ahead <= 0 {
                                break;
                            }
                            out.put(Op::Mod, 1, Some(a), Some(b), pos_org, pos_new)
                                .map_err(DiffError::Sink)?;
                            ahead -= 1;
                            pos_org += 1;
                            co = org.get(pos_org, ReadMode::Blocking)?;
                            pos_new += 1;
                            cn = new.get(pos_new, ReadMode::Blocking)?;
                        }
                    } else {
                        // Source exhausted: insert.
                        out.put(Op::Ins, 1, None, Some(bn), pos_org, pos_new)
                            .map_err(DiffError::Sink)?;
                        ahead -= 1;
                        pos_new += 1;
                        cn = new.get(pos_new, ReadMode::Blocking)?;
                    }
                }

                _ if found && ahead == 0 => {
                    // The claimed solution did not pan out. Advance by half
                    // the reliability range rather than re-searching the
                    // same window.
                    found = false;
                    self.hash_miss += 1;
                    ahead = (self.rlb / 2) as i64;
                }

                _ => {
                    flush_eql(out, pos_org, pos_new, &mut eql_count, &mut counting)?;

                    found = self.search(
                        org,
                        new,
                        pos_org,
                        pos_new,
                        &mut skip_org,
                        &mut skip_new,
                        &mut ahead,
                    )?;

                    if skip_org > 0 {
                        out.put(Op::Del, skip_org, None, None, pos_org, pos_new)
                            .map_err(DiffError::Sink)?;
                        pos_org += skip_org;
                        co = org.get(pos_org, ReadMode::Blocking)?;
                    } else if skip_org < 0 {
                        out.put(Op::Bkt, -skip_org, None, None, pos_org, pos_new)
                            .map_err(DiffError::Sink)?;
                        pos_org += skip_org;
                        co = org.get(pos_org, ReadMode::Blocking)?;
                    }
                    while skip_new > 0 {
                        let b = match cn {
                            Fetched::Byte(b) => b,
                            _ => break,
                        };
                        out.put(Op::Ins, 1, None, Some(b), pos_org, pos_new)
                            .map_err(DiffError::Sink)?;
                        skip_new -= 1;
                        pos_new += 1;
                        cn = new.get(pos_new, ReadMode::Blocking)?;
                    }
                }
            }
        }

        flush_eql(out, pos_org, pos_new, &mut eql_count, &mut counting)?;
        out.finish(pos_org, pos_new).map_err(DiffError::Sink)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookahead search
    // -----------------------------------------------------------------------

    /// Find the nearest future equal region.
    ///
    /// On success fills `(skip_org, skip_new, ahead)`; returns whether a
    /// solution was found. Without one, `ahead` still forces progress of at
    /// least one sample.
    #[allow(clippy::too_many_arguments)]
    fn search<O, N>(
        &mut self,
        org: &mut O,
        new: &mut N,
        red_org: i64,
        red_new: i64,
        skip_org: &mut i64,
        skip_new: &mut i64,
        ahead: &mut i64,
    ) -> Result<bool, DiffError>
    where
        O: ByteSource + ?Sized,
        N: ByteSource + ?Sized,
    {
        // Make sure the index covers enough of the source.
        match self.scan {
            ScanState::Prescan => {
                self.build_full_index(org)?;
                self.scan = ScanState::Indexed;
                self.rlb = self.index.reliability();
            }
            ScanState::Indexed => {}
            ScanState::Incremental => {
                org.set_lookahead_base(red_org);
                let mut max = if self.backtrack {
                    self.ahead_max
                } else if self.ahd_org < self.ahead_max / 2 {
                    // Early in the file the whole window is usable.
                    self.ahead_max - self.ahd_org
                } else {
                    // Keep the indexed span centered on the read cursor.
                    self.ahead_max / 2 - (self.ahd_org - red_org)
                };

                while max > 0 {
                    match org.get(self.ahd_org, ReadMode::SoftAhead)? {
                        Fetched::Byte(b) => {
                            let key = self.hsh_org.update(b);
                            self.index.add(key, self.ahd_org, self.hsh_org.equal_run());
                            self.ahd_org += 1;
                        }
                        _ => break,
                    }
                    max -= 1;
                }
                self.rlb = self.index.reliability();
            }
        }

        // Lookahead budget: the whole window if possible, at least the
        // reliability range.
        let mut look_max = if self.ahd_new > red_new {
            self.ahead_max - (self.ahd_new - red_new)
        } else {
            self.ahead_max
        };
        if look_max < self.rlb as i64 {
            look_max = self.rlb as i64;
        }

        // Lookback: enough to keep the match table warm and to re-prime the
        // hash without extra I/O.
        let mut look_back = red_new - self.ahd_new;
        if look_back < 0 {
            look_back = 0;
        } else if look_back > self.rlb as i64 + 2 * S - 1 {
            look_back = self.rlb as i64 + 2 * S - 1;
        }

        // Never use source positions at or before this.
        let base_org = if self.backtrack { 0 } else { org.buffer_start() };

        let mut found: usize = 0;
        match self
            .matches
            .cleanup(org, new, red_new, self.index.reliability())
            .map_err(DiffError::Source)?
        {
            MatchOutcome::Error | MatchOutcome::Full => found = self.match_max,
            MatchOutcome::Best | MatchOutcome::Good => {
                // A good match is in hand; a better one can only hide
                // within the reliability range.
                if look_max > 2 * self.rlb as i64 {
                    look_max = 2 * self.rlb as i64;
                }
            }
            _ => {}
        }

        if found < self.match_max {
            new.set_lookahead_base(red_new);
            let mut soft = found >= self.match_min;

            // Re-prime the destination hash if the lookahead cursor was
            // reset or fell too far behind.
            if self.ahd_new == 0 || self.ahd_new + look_back < red_new {
                self.ahd_new = new.buffer_start();
                if red_new > self.ahd_new + look_back {
                    self.ahd_new = (red_new - look_back).max(0);
                }

                // At a stream start one sample primes the hash; mid-stream
                // the equal-run counter needs up to one more sample first.
                // The counter equals the byte index until its first reset,
                // which marks the point where the state became exact, so
                // the warmup can shorten as soon as they diverge.
                let mut warm = if self.ahd_new == 0 {
                    WARMUP_FRESH as i64
                } else {
                    WARMUP_RESTART as i64
                };
                self.ahd_new -= 1;
                self.hsh_new.reset();
                let mode = read_mode(soft);
                let mut idx: i64 = 0;
                while idx < warm {
                    match new.get(self.ahd_new + 1, mode)? {
                        Fetched::Byte(b) => {
                            self.ahd_new += 1;
                            self.hsh_new.update(b);
                        }
                        _ => break,
                    }
                    if idx != self.hsh_new.equal_run() as i64 && warm > idx + (S - 1) {
                        warm = idx + (S - 1);
                    }
                    idx += 1;
                }
            }

            // Bytes re-read behind the cursor do not count against the
            // forward budget.
            if self.ahd_new < red_new {
                look_max += red_new - self.ahd_new;
            }

            // Scan: hash, look up, collect.
            while look_max > 0 {
                let b = match new.get(self.ahd_new + 1, read_mode(soft))? {
                    Fetched::Byte(b) => b,
                    _ => break,
                };
                self.ahd_new += 1;
                let key = self.hsh_new.update(b);
                look_max -= 1;

                let found_org = match self.index.get(key) {
                    Some(p) => p,
                    None => continue,
                };
                if found_org <= base_org {
                    continue;
                }

                match self
                    .matches
                    .add(org, new, found_org, self.ahd_new, red_new)
                    .map_err(DiffError::Source)?
                {
                    MatchOutcome::Error | MatchOutcome::Full => {
                        look_max = 0;
                    }
                    MatchOutcome::Enlarged | MatchOutcome::Invalid => {}
                    outcome => {
                        if matches!(outcome, MatchOutcome::Good | MatchOutcome::Best)
                            && look_max > self.rlb as i64
                        {
                            // Probably the answer; search out the
                            // reliability range and no further.
                            look_max = self.rlb as i64;
                        }
                        found += 1;
                        if self.ahd_new > red_new {
                            if found >= self.match_min {
                                soft = true;
                            }
                            if found >= self.match_max {
                                look_max = 0;
                            }
                        }
                    }
                }
            }
        }

        // Turn the best match into cursor movements.
        match self.matches.best_match(red_new) {
            None => {
                // No solution here; force progress past this window.
                *skip_org = 0;
                *skip_new = 0;
                *ahead = (self.ahd_new - red_new).max(S);
                Ok(false)
            }
            Some((fnd_org, fnd_new)) => {
                if fnd_org >= red_org {
                    if fnd_org - red_org >= fnd_new - red_new {
                        *skip_org = fnd_org - red_org + red_new - fnd_new;
                        *skip_new = 0;
                        *ahead = fnd_new - red_new;
                    } else {
                        *skip_org = 0;
                        *skip_new = fnd_new - red_new + red_org - fnd_org;
                        *ahead = fnd_org - red_org;
                    }
                } else {
                    // Backtrack on the source.
                    let back = red_org - fnd_org + fnd_new - red_new;
                    if back <= red_org - base_org {
                        *skip_org = -back;
                        *skip_new = 0;
                        *ahead = fnd_new - red_new;
                    } else {
                        // The window cannot scroll back that far; make up
                        // the difference on the destination.
                        *skip_new = back - (red_org - base_org);
                        *skip_org = base_org - red_org;
                        *ahead = (fnd_new - red_new) - *skip_new;
                    }
                }
                Ok(true)
            }
        }
    }

    /// Prescan: index every source sample.
    fn build_full_index<O>(&mut self, org: &mut O) -> Result<(), DiffError>
    where
        O: ByteSource + ?Sized,
    {
        let mut h = RollingHash::new();
        let mut pos: i64 = -1;

        // The first bytes only prime the state; indexing starts at the
        // first full sample.
        for _ in 0..WARMUP_FRESH {
            match org.get(pos + 1, ReadMode::HardAhead)? {
                Fetched::Byte(b) => {
                    pos += 1;
                    h.update(b);
                }
                _ => return Ok(()),
            }
        }

        loop {
            match org.get(pos + 1, ReadMode::HardAhead)? {
                Fetched::Byte(b) => {
                    pos += 1;
                    let key = h.update(b);
                    self.index.add(key, pos, h.equal_run());
                }
                _ => break,
            }
        }
        Ok(())
    }
}

fn read_mode(soft: bool) -> ReadMode {
    if soft {
        ReadMode::SoftAhead
    } else {
        ReadMode::HardAhead
    }
}

fn flush_eql<K: PatchSink>(
    out: &mut K,
    pos_org: i64,
    pos_new: i64,
    eql_count: &mut i64,
    counting: &mut bool,
) -> Result<(), DiffError> {
    if *eql_count > 0 {
        out.put(
            Op::Eql,
            *eql_count,
            None,
            None,
            pos_org - *eql_count,
            pos_new - *eql_count,
        )
        .map_err(DiffError::Sink)?;
        *eql_count = 0;
    }
    *counting = false;
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory convenience
// ---------------------------------------------------------------------------

/// Diff two in-memory streams into a patch.
pub fn diff_bytes(source: &[u8], dest: &[u8], opts: &DiffOptions) -> Result<Vec<u8>, DiffError> {
    use crate::jdf::writer::BinaryPatchWriter;
    use crate::source::AheadFile;
    use std::io::Cursor;

    let mut org = AheadFile::new(Cursor::new(source.to_vec()), 256 * 1024, 4096, false)
        .map_err(DiffError::Alloc)?;
    let mut new = AheadFile::new(Cursor::new(dest.to_vec()), 256 * 1024, 4096, false)
        .map_err(DiffError::Alloc)?;

    let mut differ = Differ::new(opts).map_err(DiffError::Alloc)?;
    let mut out = BinaryPatchWriter::new(Vec::new());
    differ.diff(&mut org, &mut new, &mut out)?;
    out.into_inner().map_err(DiffError::Sink)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdf::patcher::apply_bytes;

    fn small_opts() -> DiffOptions {
        DiffOptions {
            index_size: 1 << 20,
            ..DiffOptions::default()
        }
    }

    /// Deterministic noise: every sample window unique.
    fn rnd(n: usize, seed: u64) -> Vec<u8> {
        let mut state = seed | 1;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect()
    }

    fn roundtrip(source: &[u8], dest: &[u8]) -> Vec<u8> {
        let patch = diff_bytes(source, dest, &small_opts()).expect("diff failed");
        let rebuilt = apply_bytes(source, &patch).expect("apply failed");
        assert_eq!(
            rebuilt,
            dest,
            "roundtrip mismatch (source={}, dest={}, patch={})",
            source.len(),
            dest.len(),
            patch.len()
        );
        patch
    }

    #[test]
    fn roundtrip_empty() {
        roundtrip(b"", b"");
        roundtrip(b"nonempty", b"");
        roundtrip(b"", b"nonempty");
    }

    #[test]
    fn roundtrip_identical() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        let patch = roundtrip(&data, &data);
        // Equal inputs: EQL and framing only, far smaller than the data.
        assert!(patch.len() < 16);
    }

    #[test]
    fn roundtrip_append() {
        roundtrip(b"hello", b"hello world");
    }

    #[test]
    fn roundtrip_modification() {
        let source = rnd(8192, 11);
        let mut dest = source.clone();
        dest[4000] ^= 0xFF;
        let patch = roundtrip(&source, &dest);
        assert!(patch.len() < 256, "one-byte change blew up to {}", patch.len());
    }

    #[test]
    fn roundtrip_insertion_mid_stream() {
        let source = rnd(8192, 22);
        let mut dest = source[..4096].to_vec();
        dest.extend_from_slice(b"inserted data here");
        dest.extend_from_slice(&source[4096..]);
        let patch = roundtrip(&source, &dest);
        assert!(patch.len() < 1024);
    }

    #[test]
    fn roundtrip_deletion() {
        let source = rnd(8192, 33);
        let mut dest = source[..2048].to_vec();
        dest.extend_from_slice(&source[4096..]);
        let patch = roundtrip(&source, &dest);
        assert!(patch.len() < 1024);
    }

    #[test]
    fn roundtrip_unrelated_streams() {
        let source: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
        let dest: Vec<u8> = (0..2048).map(|i| ((i * 89 + 7) % 256) as u8).collect();
        roundtrip(&source, &dest);
    }

    #[test]
    fn roundtrip_long_runs() {
        let source = vec![0u8; 10_000];
        let mut dest = vec![0u8; 10_000];
        dest.push(0xFF);
        roundtrip(&source, &dest);
    }

    #[test]
    fn roundtrip_without_prescan() {
        let source: Vec<u8> = (0..16384).map(|i| (i % 251) as u8).collect();
        let mut dest = source.clone();
        dest[9000] = 0;
        dest[100] = 7;
        let opts = DiffOptions {
            prescan: false,
            index_size: 1 << 20,
            ..DiffOptions::default()
        };
        let patch = diff_bytes(&source, &dest, &opts).unwrap();
        assert_eq!(apply_bytes(&source, &patch).unwrap(), dest);
    }

    #[test]
    fn roundtrip_without_backtrack() {
        let source: Vec<u8> = (0..16384).map(|i| (i % 241) as u8).collect();
        let mut dest = source.clone();
        dest.drain(1000..3000);
        let opts = DiffOptions {
            backtrack: false,
            prescan: false,
            compare_all: false,
            index_size: 1 << 20,
            ..DiffOptions::default()
        };
        let patch = diff_bytes(&source, &dest, &opts).unwrap();
        assert_eq!(apply_bytes(&source, &patch).unwrap(), dest);
    }

    #[test]
    fn stats_populated_after_diff() {
        let source: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        let mut dest = source.clone();
        dest[2000] ^= 1;

        let mut org = crate::source::AheadFile::new(
            std::io::Cursor::new(source.clone()),
            64 * 1024,
            4096,
            false,
        )
        .unwrap();
        let mut new = crate::source::AheadFile::new(
            std::io::Cursor::new(dest),
            64 * 1024,
            4096,
            false,
        )
        .unwrap();
        let mut differ = Differ::new(&small_opts()).unwrap();
        let mut out = crate::jdf::writer::BinaryPatchWriter::new(Vec::new());
        differ.diff(&mut org, &mut new, &mut out).unwrap();

        let stats = differ.stats();
        assert!(stats.reliability >= (SAMPLE_SIZE + SAMPLE_SIZE / 2) as i32);
        assert!(out.counters().data > 0);
    }
}
