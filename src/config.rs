// Tuning defaults and option laddering.
//
// The defaults reproduce the classic jdiff tuning: a 32 MiB index, 1 MiB
// buffers per file, 32 KiB read blocks and a 128-record match table. The
// `better` and `lazy` ladders trade memory and search effort for accuracy
// the way the -b/-f command line flags always have.

/// Default position-index budget (bytes).
pub const DEFAULT_INDEX_SIZE: usize = 32 * 1024 * 1024;

/// Default per-file buffer size (bytes).
pub const DEFAULT_BUFFER_SIZE: i64 = 1024 * 1024;

/// Default per-file buffer size for a sequential source (bytes).
pub const DEFAULT_SEQ_SOURCE_BUFFER: i64 = 32 * 1024 * 1024;

/// Default per-file buffer size for a sequential destination (bytes).
pub const DEFAULT_SEQ_DEST_BUFFER: i64 = 16 * 1024 * 1024;

/// Default read block size (bytes).
pub const DEFAULT_BLOCK_SIZE: i64 = 32 * 1024;

/// Smallest accepted block size (bytes).
pub const MIN_BLOCK_SIZE: i64 = 4096;

/// Default match-table capacity (records).
pub const DEFAULT_MATCH_SLOTS: usize = 128;

/// Default minimum matches to collect before searching softly.
pub const DEFAULT_MATCH_MIN: usize = 2;

/// Default maximum matches to collect before stopping a search.
pub const DEFAULT_MATCH_MAX: usize = 128;

/// Floor for the lookahead window (bytes).
pub const MIN_AHEAD: i64 = 1024;

/// Tunable knobs shared by the CLI and the file helpers.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Position index budget in bytes.
    pub index_size: usize,
    /// Source-side buffer in bytes.
    pub buf_org: i64,
    /// Destination-side buffer in bytes.
    pub buf_new: i64,
    /// Read block size in bytes.
    pub block_size: i64,
    /// Lookahead window in bytes (0 = derive from the destination buffer).
    pub ahead: i64,
    /// Match-table capacity.
    pub match_slots: usize,
    /// Minimum matches before switching to soft reads.
    pub match_min: usize,
    /// Maximum matches per search.
    pub match_max: usize,
    /// Compare candidates even when their data is out of the buffers.
    pub compare_all: bool,
    /// Allow backtracking on the source.
    pub backtrack: bool,
    /// Prescan the whole source into the index.
    pub prescan: bool,
    /// Sequential source / destination declarations.
    pub seq_org: bool,
    pub seq_new: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            index_size: DEFAULT_INDEX_SIZE,
            buf_org: 0,
            buf_new: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            ahead: 0,
            match_slots: DEFAULT_MATCH_SLOTS,
            match_min: DEFAULT_MATCH_MIN,
            match_max: DEFAULT_MATCH_MAX,
            compare_all: true,
            backtrack: true,
            prescan: true,
            seq_org: false,
            seq_new: false,
        }
    }
}

impl Tuning {
    /// One step of `-b`: more memory, more searching.
    pub fn better(&mut self) {
        self.compare_all = true;
        self.backtrack = true;
        self.prescan = true;
        self.match_min *= 2;
        self.match_max *= 4;
        self.index_size *= 4;
        self.buf_org = if self.buf_org <= 0 {
            DEFAULT_BUFFER_SIZE * 4
        } else {
            self.buf_org * 4
        };
    }

    /// One step of `-f`: lazier. The first step stops out-of-buffer
    /// compares; the second also drops the full prescan.
    pub fn lazy(&mut self) {
        if self.compare_all {
            self.compare_all = false;
            self.backtrack = true;
            self.prescan = true;
            self.match_min *= 2;
            self.match_max /= 2;
            self.buf_org = if self.buf_org <= 0 {
                DEFAULT_BUFFER_SIZE * 16
            } else {
                self.buf_org * 16
            };
        } else {
            self.prescan = false;
            self.match_min /= 2;
            self.match_max /= 2;
        }
        self.index_size /= 2;
    }

    /// `-p`: the source only moves forward. Disables everything that needs
    /// random access to it.
    pub fn sequential_source(&mut self) {
        self.seq_org = true;
        self.compare_all = false;
        self.backtrack = false;
        self.prescan = false;
    }

    /// `-q`: the destination only moves forward; search within the buffer.
    pub fn sequential_dest(&mut self) {
        self.seq_new = true;
        self.match_min = 0;
    }

    /// Fill derived defaults: buffer sizes, block alignment, lookahead.
    pub fn finish(&mut self) {
        if self.buf_org <= 0 {
            self.buf_org = if self.seq_org {
                DEFAULT_SEQ_SOURCE_BUFFER
            } else {
                DEFAULT_BUFFER_SIZE
            };
        }
        if self.buf_new <= 0 {
            self.buf_new = if self.seq_new {
                DEFAULT_SEQ_DEST_BUFFER
            } else {
                self.buf_org
            };
        }
        if self.block_size < MIN_BLOCK_SIZE {
            self.block_size = MIN_BLOCK_SIZE;
        }

        // Buffers are block-aligned, at least one block each.
        for buf in [&mut self.buf_org, &mut self.buf_new] {
            *buf -= *buf % self.block_size;
            if *buf <= 0 {
                *buf = self.block_size;
            }
        }

        if self.ahead == 0 {
            self.ahead = (self.buf_new - self.block_size).max(MIN_AHEAD);
        }
        if self.match_min > self.match_max {
            self.match_min = self.match_max.saturating_sub(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_block_aligned() {
        let mut t = Tuning::default();
        t.finish();
        assert_eq!(t.buf_org % t.block_size, 0);
        assert_eq!(t.buf_new % t.block_size, 0);
        assert!(t.ahead >= MIN_AHEAD);
    }

    #[test]
    fn better_scales_up() {
        let mut t = Tuning::default();
        t.better();
        assert_eq!(t.index_size, DEFAULT_INDEX_SIZE * 4);
        assert_eq!(t.match_max, DEFAULT_MATCH_MAX * 4);
        assert!(t.compare_all && t.backtrack && t.prescan);
    }

    #[test]
    fn lazy_twice_disables_prescan() {
        let mut t = Tuning::default();
        t.lazy();
        assert!(!t.compare_all);
        assert!(t.prescan);
        t.lazy();
        assert!(!t.prescan);
        assert_eq!(t.index_size, DEFAULT_INDEX_SIZE / 4);
    }

    #[test]
    fn sequential_source_disables_random_access() {
        let mut t = Tuning::default();
        t.sequential_source();
        assert!(t.seq_org && !t.backtrack && !t.prescan && !t.compare_all);
    }

    #[test]
    fn match_min_capped_by_match_max() {
        let mut t = Tuning {
            match_min: 100,
            match_max: 10,
            ..Tuning::default()
        };
        t.finish();
        assert_eq!(t.match_min, 9);
    }
}
