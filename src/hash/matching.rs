// Match table: candidate equal-regions between source and destination.
//
// The index only covers a fraction of all samples and its keys are lossy,
// so the first hit is neither certainly real nor certainly the nearest.
// Hits are therefore collected into a bounded table of candidate regions,
// each verified lazily by byte comparison, and the best is elected at every
// decision point.
//
// A hit either confirms an existing record or starts a new one:
//   - **Colliding** confirmation: same `delta = org − new` offset. The
//     normal case: the two streams track each other at a fixed displacement.
//   - **Gliding** confirmation: same source position matching ever-later
//     destination positions. Arises over long runs of one byte, where a
//     single source sample matches a whole stretch of the destination.
// A record sits in exactly one bucket of each kind until its second
// confirmation decides which kind it is.
//
// Records live in a fixed pool and are never freed; aging decides which may
// be overwritten. Links are u32 record ids into the pool rather than
// pointers; NIL marks the end of a list.

use std::collections::TryReserveError;

use super::largest_prime_at_most;
use super::rolling::SAMPLE_SIZE;
use crate::source::{ByteSource, Fetched, ReadMode, SourceError};

// Continuous runs of 8 equal bytes are worth jumping to; comparisons stop
// growing at 256. A run shorter than 5 equal bytes does not count at all.
pub(crate) const EQL_MIN: i32 = 4;
pub(crate) const EQL_GOOD: i32 = 8;
pub(crate) const EQL_MAX: i32 = 256;

/// Byte-compare probe distance bounds.
const MIN_DIST: i64 = 1024;
const MAX_DIST: i64 = 2 * 1024 * 1024;

/// Ties within this many destination bytes count as equal when electing.
const FUZZINESS: i64 = 0;

// `test_len` sentinels.
const CMP_INVALID: i32 = -1;
const CMP_SKIPPED: i32 = -2;
const CMP_EOB: i32 = -3;

const NIL: u32 = u32::MAX;

/// Outcome of feeding a hit to the table (or of a cleanup pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The table is full and nothing could be reused.
    Error,
    /// Added, but no slot remains for the next one.
    Full,
    /// An existing record absorbed the hit.
    Enlarged,
    /// Comparison showed the record does not match here.
    Invalid,
    /// A usable candidate.
    Valid,
    /// A candidate with a confirmed run of at least EQL_GOOD bytes.
    Good,
    /// A candidate with a confirmed run of at least EQL_MAX bytes.
    Best,
}

/// One candidate equal-region.
#[derive(Debug, Clone)]
struct MatchRec {
    /// Aging list link (new list, then old list).
    next: u32,
    /// Colliding-delta bucket link.
    col: u32,
    /// Gliding-source bucket link.
    gld: u32,

    /// Confirmations from the index.
    count: i32,
    /// Gliding step (0 = not gliding), saturated at SAMPLE_SIZE.
    glide: i32,

    /// First destination position confirmed from the index.
    new_first: i64,
    /// Last destination position confirmed from the index.
    new_last: i64,
    /// Matched source position.
    org: i64,
    /// `org − new_last` at creation: the displacement a colliding
    /// confirmation must reproduce.
    delta: i64,

    /// Destination position of the last byte-compare probe result.
    test_pos: i64,
    /// Length found by that probe, or a CMP_* sentinel.
    test_len: i32,
}

/// Bounded table of candidate matches.
pub struct MatchTable {
    recs: Vec<MatchRec>,
    col_heads: Vec<u32>,
    gld_heads: Vec<u32>,
    prime: usize,

    /// Unused slots are handed out from the top of the pool downward.
    free: usize,
    old_head: u32,
    new_head: u32,
    new_tail: u32,

    best: u32,
    best_org: i64,
    best_new: i64,
    best_len: i32,
    /// Records whose equal-run lies entirely before this may be reused.
    old_limit: i64,

    /// Reliability range, refreshed from the index at each cleanup.
    reliability: i32,
    /// Compare even when the data is outside the buffers?
    compare_all: bool,

    /// Hits downgraded by an actual byte comparison.
    repairs: u64,
}

impl MatchTable {
    /// Build a table of `slots` records (minimum 13) with bucket arrays
    /// sized to the largest prime ≤ 2 × slots.
    pub fn new(slots: usize, compare_all: bool) -> Result<Self, TryReserveError> {
        let slots = slots.max(13);
        let prime = largest_prime_at_most(slots * 2);

        let mut recs = Vec::new();
        recs.try_reserve_exact(slots)?;
        recs.resize(
            slots,
            MatchRec {
                next: NIL,
                col: NIL,
                gld: NIL,
                count: 0,
                glide: 0,
                new_first: 0,
                new_last: 0,
                org: 0,
                delta: 0,
                test_pos: -1,
                test_len: 0,
            },
        );
        let mut col_heads = Vec::new();
        col_heads.try_reserve_exact(prime)?;
        col_heads.resize(prime, NIL);
        let mut gld_heads = Vec::new();
        gld_heads.try_reserve_exact(prime)?;
        gld_heads.resize(prime, NIL);

        Ok(Self {
            recs,
            col_heads,
            gld_heads,
            prime,
            free: slots,
            old_head: NIL,
            new_head: NIL,
            new_tail: NIL,
            best: NIL,
            best_org: 0,
            best_new: 0,
            best_len: 0,
            old_limit: 0,
            reliability: 0,
            compare_all,
            repairs: 0,
        })
    }

    /// Hits that a byte comparison downgraded to non-matches.
    pub fn repairs(&self) -> u64 {
        self.repairs
    }

    // -----------------------------------------------------------------------
    // Add
    // -----------------------------------------------------------------------

    /// Attach an index hit `(found_org, found_new)` to the table.
    ///
    /// `read_new` is the current destination read cursor.
    pub fn add<O, N>(
        &mut self,
        org: &mut O,
        new: &mut N,
        found_org: i64,
        found_new: i64,
        read_new: i64,
    ) -> Result<MatchOutcome, SourceError>
    where
        O: ByteSource + ?Sized,
        N: ByteSource + ?Sized,
    {
        let delta = found_org - found_new;
        let slot_col = (delta.unsigned_abs() % self.prime as u64) as usize;
        let slot_gld = (found_org as u64 % self.prime as u64) as usize;

        // Colliding confirmation: same displacement.
        let mut cur = NIL;
        let mut c = self.col_heads[slot_col];
        while c != NIL {
            if self.recs[c as usize].delta == delta {
                if self.recs[c as usize].count == 1 {
                    self.del_gld(c);
                }
                self.recs[c as usize].count += 1;
                self.recs[c as usize].new_last = found_new;
                cur = c;
                break;
            }
            c = self.recs[c as usize].col;
        }

        // Gliding confirmation: same source position.
        if cur == NIL {
            let mut g = self.gld_heads[slot_gld];
            while g != NIL {
                let r = &mut self.recs[g as usize];
                if r.org == found_org {
                    r.count += 1;
                    r.new_last = found_new;
                    if r.glide == 0 {
                        r.glide = if found_new <= r.new_first + SAMPLE_SIZE as i64 {
                            (found_new - r.new_first) as i32
                        } else {
                            SAMPLE_SIZE as i32
                        };
                    }
                    let second = r.count == 2;
                    if second {
                        self.del_col(g);
                    }
                    cur = g;
                    break;
                }
                g = self.recs[g as usize].gld;
            }
        }

        // A renewed record at the head of the old list moves back to the
        // new list.
        if cur != NIL && self.old_head == cur {
            self.old_head = self.recs[cur as usize].next;
            self.next_old(read_new);
            self.add_new(cur);
        }

        // No existing record: allocate one.
        if cur == NIL {
            if self.free > 0 {
                self.free -= 1;
                cur = self.free as u32;
            } else if self.old_head != NIL {
                cur = self.old_head;
                self.old_head = self.recs[cur as usize].next;
                self.next_old(read_new);

                let (count, glide) = {
                    let r = &self.recs[cur as usize];
                    (r.count, r.glide)
                };
                if count == 1 || glide == 0 {
                    self.del_col(cur);
                }
                if count == 1 || glide != 0 {
                    self.del_gld(cur);
                }
            } else {
                return Ok(MatchOutcome::Error);
            }

            let r = &mut self.recs[cur as usize];
            r.org = found_org;
            r.new_first = found_new;
            r.new_last = found_new;
            r.delta = delta;
            r.count = 1;
            r.glide = 0;
            r.test_pos = -1;
            r.test_len = 0;
            r.col = self.col_heads[slot_col];
            self.col_heads[slot_col] = cur;
            r.gld = self.gld_heads[slot_gld];
            self.gld_heads[slot_gld] = cur;
        }

        // Fresh and reactivated (skipped) records get evaluated right away.
        let mut ret = MatchOutcome::Enlarged;
        let (count, skipped) = {
            let r = &self.recs[cur as usize];
            (r.count, r.test_len == CMP_SKIPPED)
        };
        if count == 1 || skipped {
            if skipped {
                self.recs[cur as usize].test_len = 0;
            }
            ret = self.is_good_or_best(org, new, read_new, cur)?;
            match ret {
                MatchOutcome::Invalid => {
                    let fully_checked = {
                        let r = &self.recs[cur as usize];
                        r.test_pos >= r.new_last
                    };
                    if fully_checked {
                        self.repairs += 1;
                        self.recs[cur as usize].test_len = CMP_INVALID;
                        // Fresh invalids go to the front of the new list so
                        // they become reuse victims early.
                        if self.recs[cur as usize].count == 1 {
                            if self.new_head == NIL {
                                self.new_tail = cur;
                            }
                            self.recs[cur as usize].next = self.new_head;
                            self.new_head = cur;
                        }
                    } else if self.recs[cur as usize].count == 1 {
                        // Not fully evaluated: keep it around like a valid.
                        self.add_new(cur);
                    }
                }
                MatchOutcome::Valid | MatchOutcome::Good | MatchOutcome::Best => {
                    if self.recs[cur as usize].count == 1 {
                        self.add_new(cur);
                    }
                }
                _ => {}
            }
        }

        if self.free == 0 && self.old_head == NIL {
            Ok(MatchOutcome::Full)
        } else {
            Ok(ret)
        }
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Re-evaluate the whole table against the read cursor, marking
    /// skippable records and preparing the reuse frontier.
    ///
    /// Returns `Full`, `Invalid` (no best), `Valid`, `Good` or `Best`.
    pub fn cleanup<O, N>(
        &mut self,
        org: &mut O,
        new: &mut N,
        read_new: i64,
        reliability: i32,
    ) -> Result<MatchOutcome, SourceError>
    where
        O: ByteSource + ?Sized,
        N: ByteSource + ?Sized,
    {
        self.reliability = reliability;
        self.join_lists();

        self.best = NIL;
        self.old_limit = read_new;

        let mut cur = self.old_head;
        while cur != NIL {
            let next = self.recs[cur as usize].next;
            if self.is_old_to_skip(cur, read_new) {
                self.recs[cur as usize].test_len = CMP_SKIPPED;
            } else {
                self.is_good_or_best(org, new, read_new, cur)?;
            }
            cur = next;
        }

        self.next_old(read_new);

        if self.old_head == NIL && self.free == 0 {
            Ok(MatchOutcome::Full)
        } else if self.best == NIL {
            Ok(MatchOutcome::Invalid)
        } else if self.best_new != read_new {
            Ok(MatchOutcome::Valid)
        } else if self.best_len >= EQL_MAX {
            Ok(MatchOutcome::Best)
        } else if self.best_len >= EQL_GOOD {
            Ok(MatchOutcome::Good)
        } else {
            Ok(MatchOutcome::Valid)
        }
    }

    // -----------------------------------------------------------------------
    // Best retrieval
    // -----------------------------------------------------------------------

    /// The best `(org, new)` position pair, if any candidate survived.
    ///
    /// Without compare-all, end-of-buffer records whose `new_last` advanced
    /// past their probe position are re-scored from their hit counts first
    /// (the sentinel is trusted; no re-probe happens).
    pub fn best_match(&mut self, read_new: i64) -> Option<(i64, i64)> {
        if !self.compare_all {
            self.join_lists();

            let mut best_eob = false;
            let mut cur = self.old_head;
            while cur != NIL {
                let (next, test_len, test_pos, new_last) = {
                    let r = &self.recs[cur as usize];
                    (r.next, r.test_len, r.test_pos, r.new_last)
                };
                if cur != self.best && test_len <= CMP_EOB && new_last > test_pos {
                    if self.is_best(cur, read_new, 0, test_pos, test_len) {
                        best_eob = true;
                    }
                }
                cur = next;
            }

            if best_eob && self.best_org == 0 {
                let (o, n, _) = self.calc_pos_org(self.best, self.best_new);
                self.best_org = o;
                self.best_new = n;
            }
        }

        if self.best != NIL {
            Some((self.best_org, self.best_new))
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluate one record against the read cursor, reusing the previous
    /// probe where possible, and elect it if best.
    fn is_good_or_best<O, N>(
        &mut self,
        org: &mut O,
        new: &mut N,
        read_new: i64,
        id: u32,
    ) -> Result<MatchOutcome, SourceError>
    where
        O: ByteSource + ?Sized,
        N: ByteSource + ?Sized,
    {
        let (mut tst_org, mut tst_new, gliding) = self.calc_pos_org(id, read_new);

        let cur_len: i32;
        let (test_pos, test_len, new_first, rec_org) = {
            let r = &self.recs[id as usize];
            (r.test_pos, r.test_len, r.new_first, r.org)
        };

        if tst_new <= test_pos {
            // Still before the previous probe result: reuse it.
            cur_len = if test_len == CMP_SKIPPED || test_len == CMP_INVALID {
                0
            } else {
                test_len
            };
            if gliding {
                tst_new = test_pos;
                tst_org = rec_org;
            } else {
                tst_org += test_pos - tst_new;
                tst_new = test_pos;
            }
        } else if !gliding
            && test_len > 0
            && test_pos - tst_new + test_len as i64 > EQL_MIN as i64
        {
            // Inside the previous successful probe: the remainder counts.
            cur_len = (test_pos - tst_new + test_len as i64) as i32;
        } else {
            // Probe (again).
            let dist = (new_first - tst_new).clamp(MIN_DIST, MAX_DIST);
            let glide = if gliding {
                self.recs[id as usize].glide
            } else {
                0
            };
            let mode = if self.compare_all {
                ReadMode::HardAhead
            } else {
                ReadMode::SoftAhead
            };
            cur_len = check(org, new, &mut tst_org, &mut tst_new, dist, glide, mode)?;

            let r = &mut self.recs[id as usize];
            r.test_pos = tst_new;
            if !(r.test_len == CMP_INVALID && cur_len <= 0) {
                r.test_len = cur_len;
            }
        }

        // A maxed-out probe probably extends at least to the last confirmed
        // hit.
        let mut cur_len = cur_len;
        {
            let r = &self.recs[id as usize];
            if r.test_len >= EQL_MAX && r.new_last > tst_new + cur_len as i64 {
                cur_len += (r.new_last - tst_new) as i32;
            }
        }

        self.is_best(id, read_new, tst_org, tst_new, cur_len);

        Ok(if cur_len == 0 {
            MatchOutcome::Invalid
        } else if tst_new != read_new {
            MatchOutcome::Valid
        } else if cur_len >= EQL_MAX {
            MatchOutcome::Best
        } else if cur_len >= EQL_GOOD {
            MatchOutcome::Good
        } else {
            MatchOutcome::Valid
        })
    }

    /// Elect `id` as the best record if it beats the incumbent.
    ///
    /// End-of-buffer records have no compared length; they get a synthetic
    /// score from their hit count, clamped so a real comparison always
    /// outranks a hashtable-only guess.
    fn is_best(
        &mut self,
        id: u32,
        read_new: i64,
        mut tst_org: i64,
        mut tst_new: i64,
        mut cur_len: i32,
    ) -> bool {
        let mut cur_cnt: i32 = -1;
        let rlb = self.reliability;
        let (glide, count, new_first, new_last, rec_org) = {
            let r = &self.recs[id as usize];
            (r.glide, r.count, r.new_first, r.new_last, r.org)
        };

        if cur_len <= CMP_EOB {
            cur_cnt = if glide > 0 { 1 + count / 2 } else { count };

            if tst_new <= new_first {
                // Still before the first detected hit: the solution
                // probably starts there.
                cur_len = cur_cnt;
                tst_new = new_first;
                tst_org = rec_org;
            } else if tst_new <= new_last + rlb as i64 {
                // Between first and last hit: estimate the distance to an
                // equality from the hit density.
                cur_len = cur_cnt;
                let dst = 1 + (rlb - rlb.min(count)) as i64;
                tst_new += dst;
                tst_org += dst;
            } else {
                // Aging: discount the count by the distance fallen behind.
                cur_len = cur_cnt - 1 - ((tst_new - new_last) / (rlb as i64 / 8)) as i32;
                let dst = (cur_cnt - cur_len) as i64;
                tst_new += dst;
                tst_org += dst;
            }
            if cur_len < 1 {
                cur_len = 1;
            } else {
                cur_len = 1 + EQL_MAX.min(cur_len) / 2;
            }

            // Remember the score for the aging checks, negated to keep the
            // end-of-buffer marking.
            if cur_len > 3 {
                self.recs[id as usize].test_len = -cur_len;
            }
        }

        if cur_len > 0 {
            let mut take = false;
            if self.best == NIL {
                take = true;
            } else if cur_len < 2 && self.best_len > 4 {
                // Low-confidence candidate against a solid best: keep best.
            } else if self.best_len < 2 && cur_len > 4 {
                take = true;
            } else if tst_new + FUZZINESS < self.best_new {
                take = true;
            } else if tst_new <= self.best_new + FUZZINESS {
                if tst_new - (cur_len as i64) < self.best_new - self.best_len as i64 {
                    take = true;
                } else if tst_new - cur_len as i64 == self.best_new - self.best_len as i64 {
                    // All else equal: trust the hash counter.
                    if cur_cnt < 0 {
                        cur_cnt = if glide > 0 { count / 2 } else { count };
                    }
                    let b = &self.recs[self.best as usize];
                    let best_cnt = if b.glide > 0 { b.count / 2 } else { b.count };
                    if cur_cnt > best_cnt {
                        take = true;
                    }
                }
            }

            if take {
                self.best = id;
                self.best_org = tst_org;
                self.best_new = tst_new;
                self.best_len = cur_len;

                // Everything wholly before the elected run minus the
                // reliability margin is reusable.
                let r = &self.recs[id as usize];
                self.old_limit = r.test_pos + (r.test_len.min(0)) as i64 - rlb as i64;
                if self.old_limit < read_new {
                    self.old_limit = read_new;
                }
            }
        }

        self.best == id
    }

    // -----------------------------------------------------------------------
    // Aging
    // -----------------------------------------------------------------------

    /// Can this record be marked skipped (dormant until renewed)?
    fn is_old_to_skip(&self, id: u32, read_new: i64) -> bool {
        let r = &self.recs[id as usize];
        match r.test_len {
            CMP_SKIPPED => true,
            CMP_INVALID | 0 => r.new_last + MAX_DIST <= read_new,
            _ => {
                r.new_last + MAX_DIST <= read_new
                    && r.test_pos + (r.test_len.unsigned_abs() as i64) < read_new
            }
        }
    }

    /// Can this record be overwritten by a new allocation?
    fn is_old_to_reuse(&self, id: u32) -> bool {
        let r = &self.recs[id as usize];
        match r.test_len {
            CMP_SKIPPED | CMP_INVALID => true,
            CMP_EOB => id != self.best && r.new_last < self.old_limit,
            0 => r.new_last < r.test_pos || r.new_last < self.old_limit,
            _ => {
                id != self.best
                    && r.new_last < self.old_limit
                    && r.test_pos + (r.test_len.unsigned_abs() as i64) < self.old_limit
            }
        }
    }

    /// Bring a reusable record to the head of the old list.
    fn next_old(&mut self, _read_new: i64) -> bool {
        // Rotate non-reusable heads back onto the new list.
        while self.old_head != NIL {
            if self.is_old_to_reuse(self.old_head) {
                break;
            }
            let cur = self.old_head;
            self.old_head = self.recs[cur as usize].next;
            self.add_new(cur);
        }

        // Nothing reusable: pull fresh invalids off the new list.
        if self.old_head == NIL && self.new_head != NIL {
            self.recs[self.new_tail as usize].next = NIL;
            let mut cur = self.new_head;
            while cur != NIL && self.recs[cur as usize].test_len == CMP_INVALID {
                let next = self.recs[cur as usize].next;
                self.new_head = next;
                let reactivate = {
                    let r = &self.recs[cur as usize];
                    r.count > 1 && r.new_last > r.test_pos
                };
                if reactivate {
                    // An invalid that has been enlarged since may live on.
                    self.recs[cur as usize].test_len = 0;
                    self.add_new(cur);
                } else {
                    self.recs[cur as usize].next = self.old_head;
                    self.old_head = cur;
                    break;
                }
                cur = next;
            }
        }

        self.old_head != NIL
    }

    // -----------------------------------------------------------------------
    // Geometry
    // -----------------------------------------------------------------------

    /// Source position corresponding to a destination position for this
    /// record. Returns `(org, new, gliding)`; `new` is advanced when the
    /// source position would otherwise become negative.
    fn calc_pos_org(&self, id: u32, tst_new: i64) -> (i64, i64, bool) {
        let r = &self.recs[id as usize];
        if r.glide > 0 && tst_new >= r.new_first {
            (r.org, tst_new, true)
        } else if tst_new + r.delta >= 0 {
            (tst_new + r.delta, tst_new, false)
        } else {
            (0, -r.delta, false)
        }
    }

    // -----------------------------------------------------------------------
    // List plumbing
    // -----------------------------------------------------------------------

    /// Splice the new list onto the front of the old list.
    fn join_lists(&mut self) {
        if self.new_head != NIL {
            self.recs[self.new_tail as usize].next = self.old_head;
            self.old_head = self.new_head;
            self.new_head = NIL;
            self.new_tail = NIL;
        }
    }

    /// Append to the new list. The tail's `next` is left stale on purpose;
    /// `join_lists` fixes it up.
    fn add_new(&mut self, id: u32) {
        if self.new_head == NIL {
            self.new_head = id;
        } else {
            self.recs[self.new_tail as usize].next = id;
        }
        self.new_tail = id;
    }

    fn del_gld(&mut self, id: u32) {
        let slot = (self.recs[id as usize].org as u64 % self.prime as u64) as usize;
        if self.gld_heads[slot] == id {
            self.gld_heads[slot] = self.recs[id as usize].gld;
            return;
        }
        let mut cur = self.gld_heads[slot];
        while cur != NIL {
            if self.recs[cur as usize].gld == id {
                self.recs[cur as usize].gld = self.recs[id as usize].gld;
                return;
            }
            cur = self.recs[cur as usize].gld;
        }
    }

    fn del_col(&mut self, id: u32) {
        let slot =
            (self.recs[id as usize].delta.unsigned_abs() % self.prime as u64) as usize;
        if self.col_heads[slot] == id {
            self.col_heads[slot] = self.recs[id as usize].col;
            return;
        }
        let mut cur = self.col_heads[slot];
        while cur != NIL {
            if self.recs[cur as usize].col == id {
                self.recs[cur as usize].col = self.recs[id as usize].col;
                return;
            }
            cur = self.recs[cur as usize].col;
        }
    }
}

// ---------------------------------------------------------------------------
// Byte comparison
// ---------------------------------------------------------------------------

/// Search for a run of equal bytes at the given positions.
///
/// Compares up to EQL_MAX matching bytes. On a mismatch before EQL_GOOD
/// equals, searching resumes for up to `dist` further destination bytes: in
/// gliding mode the source position rewinds to the candidate start, in
/// colliding mode both positions advance.
///
/// On success the positions are rewound to the start of the found run and
/// its length (> EQL_MIN) is returned; 0 means no run, CMP_EOB that the
/// window ran out first.
fn check<O, N>(
    org: &mut O,
    new: &mut N,
    pos_org: &mut i64,
    pos_new: &mut i64,
    dist: i64,
    glide: i32,
    mode: ReadMode,
) -> Result<i32, SourceError>
where
    O: ByteSource + ?Sized,
    N: ByteSource + ?Sized,
{
    let mut eql: i32 = 0;
    let mut remaining = dist;
    let mut hit_eob = false;

    while eql < EQL_MAX {
        let co = match org.get(*pos_org, mode)? {
            Fetched::Byte(b) => b,
            Fetched::Eob => {
                hit_eob = true;
                break;
            }
            Fetched::Eof => break,
        };
        let cn = match new.get(*pos_new, mode)? {
            Fetched::Byte(b) => b,
            Fetched::Eob => {
                hit_eob = true;
                break;
            }
            Fetched::Eof => break,
        };

        if co == cn {
            *pos_org += 1;
            *pos_new += 1;
            eql += 1;
        } else if eql >= EQL_GOOD {
            break;
        } else if remaining <= 0 {
            break;
        } else {
            *pos_new += 1;
            if glide != 0 {
                *pos_org -= eql as i64;
            } else {
                *pos_org += 1;
            }
            eql = 0;
        }
        remaining -= 1;
    }

    if eql > EQL_MIN {
        *pos_org -= eql as i64;
        *pos_new -= eql as i64;
        Ok(eql)
    } else if hit_eob {
        Ok(CMP_EOB)
    } else {
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::AheadFile;
    use std::io::Cursor;

    fn src(data: &[u8]) -> AheadFile<Cursor<Vec<u8>>> {
        AheadFile::new(Cursor::new(data.to_vec()), 4096, 256, false).unwrap()
    }

    #[test]
    fn check_finds_aligned_run() {
        let mut o = src(b"0123456789abcdefghij");
        let mut n = src(b"0123456789abcdefghij");
        let mut po = 0i64;
        let mut pn = 0i64;
        let len =
            check(&mut o, &mut n, &mut po, &mut pn, 64, 0, ReadMode::HardAhead).unwrap();
        assert_eq!(len, 20);
        assert_eq!((po, pn), (0, 0));
    }

    #[test]
    fn check_resynchronizes_colliding() {
        // Same delta throughout; the first 3 bytes differ.
        let mut o = src(b"XYZcommon-suffix-here");
        let mut n = src(b"ABCcommon-suffix-here");
        let mut po = 0i64;
        let mut pn = 0i64;
        let len =
            check(&mut o, &mut n, &mut po, &mut pn, 64, 0, ReadMode::HardAhead).unwrap();
        assert_eq!(len, 18);
        assert_eq!((po, pn), (3, 3));
    }

    #[test]
    fn check_short_run_is_no_match() {
        let mut o = src(b"abcZZZZZZZZZZ");
        let mut n = src(b"abcdefghijklm");
        let mut po = 0i64;
        let mut pn = 0i64;
        let len =
            check(&mut o, &mut n, &mut po, &mut pn, 4, 0, ReadMode::HardAhead).unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn check_gliding_rewinds_source() {
        // A run of zeros in the source glides over the destination.
        let mut o = src(&[0u8; 32]);
        let mut n = {
            let mut d = vec![1u8, 2, 3];
            d.extend_from_slice(&[0u8; 16]);
            src(&d)
        };
        let mut po = 0i64;
        let mut pn = 0i64;
        let len =
            check(&mut o, &mut n, &mut po, &mut pn, 16, 1, ReadMode::HardAhead).unwrap();
        assert!(len > EQL_MIN);
        assert_eq!(po, 0);
        assert_eq!(pn, 3);
    }

    #[test]
    fn check_reports_eob() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        let mut o = src(&data);
        let mut n = src(&data);
        // Pin the window at the start, then probe far beyond it softly.
        o.set_lookahead_base(0);
        n.set_lookahead_base(0);
        let mut po = 100_000i64;
        let mut pn = 100_000i64;
        let len =
            check(&mut o, &mut n, &mut po, &mut pn, 64, 0, ReadMode::SoftAhead).unwrap();
        assert_eq!(len, CMP_EOB);
    }

    #[test]
    fn add_confirms_colliding_match() {
        let data: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
        let mut o = src(&data);
        let mut n = src(&data);
        let mut t = MatchTable::new(16, true).unwrap();
        t.reliability = 96;

        // Two hits with the same delta confirm one record.
        let r1 = t.add(&mut o, &mut n, 100, 100, 0).unwrap();
        assert!(matches!(
            r1,
            MatchOutcome::Valid | MatchOutcome::Good | MatchOutcome::Best
        ));
        let r2 = t.add(&mut o, &mut n, 200, 200, 0).unwrap();
        assert_eq!(r2, MatchOutcome::Enlarged);
    }

    #[test]
    fn cleanup_elects_identical_streams() {
        let data: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
        let mut o = src(&data);
        let mut n = src(&data);
        let mut t = MatchTable::new(16, true).unwrap();
        t.add(&mut o, &mut n, 64, 64, 0).unwrap();

        let out = t.cleanup(&mut o, &mut n, 0, 96).unwrap();
        // Delta 0 at cursor 0: the probe finds a long run right here.
        assert_eq!(out, MatchOutcome::Best);
        let (bo, bn) = t.best_match(0).unwrap();
        assert_eq!((bo, bn), (0, 0));
    }

    #[test]
    fn invalid_hits_are_repaired() {
        let a: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
        let b: Vec<u8> = (0..2048).map(|i| (251 - (i % 251)) as u8).collect();
        let mut o = src(&a);
        let mut n = src(&b);
        let mut t = MatchTable::new(16, true).unwrap();
        t.reliability = 96;

        // Nothing matches between these streams at delta 0.
        let r = t.add(&mut o, &mut n, 500, 500, 400).unwrap();
        assert_eq!(r, MatchOutcome::Invalid);
        assert_eq!(t.repairs(), 1);
    }

    #[test]
    fn table_reports_full() {
        let data: Vec<u8> = (0..8192).map(|i| (i % 251) as u8).collect();
        let b: Vec<u8> = data.iter().map(|&x| x ^ 0xFF).collect();
        let mut o = src(&data);
        let mut n = src(&b);
        let mut t = MatchTable::new(13, true).unwrap();
        t.reliability = 96;

        // Distinct deltas, none valid, none old enough to reuse: the pool
        // must eventually report Full or Error.
        let mut saw_exhaustion = false;
        for i in 0..64i64 {
            match t
                .add(&mut o, &mut n, 4000 + 17 * i, 10 + i, 5)
                .unwrap()
            {
                MatchOutcome::Full | MatchOutcome::Error => {
                    saw_exhaustion = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_exhaustion);
    }

    #[test]
    fn gliding_run_confirms_same_source_position() {
        let zeros = vec![0u8; 1024];
        let mut o = src(&zeros);
        let mut n = src(&zeros);
        let mut t = MatchTable::new(16, true).unwrap();
        t.reliability = 96;

        t.add(&mut o, &mut n, 64, 64, 0).unwrap();
        // Same source position, later destination position: gliding.
        t.add(&mut o, &mut n, 64, 80, 0).unwrap();
        let out = t.cleanup(&mut o, &mut n, 0, 96).unwrap();
        assert!(matches!(out, MatchOutcome::Best | MatchOutcome::Good));
    }
}
