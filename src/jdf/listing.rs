// Human-readable sinks: per-byte listing and grouped regions.
//
// Both drive the same operator stream as the binary writer, so diff output
// can be inspected without decoding a patch. Neither produces a replayable
// patch.

use std::io::{self, Write};

use super::writer::{PatchSink, SinkCounters};
use super::Op;

fn printable(b: Option<u8>) -> char {
    match b {
        Some(b) if (32..=126).contains(&b) => b as char,
        _ => ' ',
    }
}

// ---------------------------------------------------------------------------
// Per-byte listing
// ---------------------------------------------------------------------------

/// Lists every operator, one line per byte for data operators.
pub struct ListingSink<W: Write> {
    out: W,
    counters: SinkCounters,
}

impl<W: Write> ListingSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            counters: SinkCounters::default(),
        }
    }
}

impl<W: Write> PatchSink for ListingSink<W> {
    fn put(
        &mut self,
        op: Op,
        len: i64,
        org: Option<u8>,
        new: Option<u8>,
        pos_org: i64,
        pos_new: i64,
    ) -> io::Result<bool> {
        match op {
            Op::Eql | Op::Mod | Op::Ins => {
                let (o, n) = (org.unwrap_or(0), new.unwrap_or(0));
                writeln!(
                    self.out,
                    "{pos_org:>12} {pos_new:>12} {} {o:02x} {n:02x} {}{}",
                    op.name(),
                    printable(org),
                    printable(new),
                )?;
                match op {
                    Op::Eql => self.counters.equal += len,
                    _ => self.counters.data += len,
                }
            }
            Op::Del | Op::Bkt => {
                writeln!(
                    self.out,
                    "{pos_org:>12} {pos_new:>12} {} {len}",
                    op.name()
                )?;
                match op {
                    Op::Del => self.counters.delete += len,
                    _ => self.counters.backtrack += len,
                }
            }
        }
        // Never hand equal-run counting to the driver: list every byte.
        Ok(false)
    }

    fn finish(&mut self, pos_org: i64, pos_new: i64) -> io::Result<()> {
        writeln!(self.out, "{pos_org:>12} {pos_new:>12} EOF")?;
        self.out.flush()
    }

    fn counters(&self) -> &SinkCounters {
        &self.counters
    }
}

// ---------------------------------------------------------------------------
// Grouped regions
// ---------------------------------------------------------------------------

/// Groups consecutive same-operator bytes into one line per region.
pub struct RegionsSink<W: Write> {
    out: W,
    counters: SinkCounters,
    cur: Option<(Op, i64, i64, i64)>, // op, start_org, start_new, length
}

impl<W: Write> RegionsSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            counters: SinkCounters::default(),
            cur: None,
        }
    }

    fn flush_region(&mut self) -> io::Result<()> {
        if let Some((op, so, sn, len)) = self.cur.take() {
            writeln!(self.out, "{so:>12} {sn:>12} {} {len}", op.name())?;
        }
        Ok(())
    }
}

impl<W: Write> PatchSink for RegionsSink<W> {
    fn put(
        &mut self,
        op: Op,
        len: i64,
        _org: Option<u8>,
        _new: Option<u8>,
        pos_org: i64,
        pos_new: i64,
    ) -> io::Result<bool> {
        match op {
            Op::Eql => self.counters.equal += len,
            Op::Mod | Op::Ins => self.counters.data += len,
            Op::Del => self.counters.delete += len,
            Op::Bkt => self.counters.backtrack += len,
        }

        let extends = matches!(self.cur, Some((cur_op, _, _, _)) if cur_op == op);
        if extends {
            if let Some((_, _, _, cur_len)) = &mut self.cur {
                *cur_len += len;
            }
        } else {
            self.flush_region()?;
            self.cur = Some((op, pos_org, pos_new, len));
        }
        // Length-bearing operators end their region immediately.
        if matches!(op, Op::Del | Op::Bkt) {
            self.flush_region()?;
        }
        Ok(true)
    }

    fn finish(&mut self, pos_org: i64, pos_new: i64) -> io::Result<()> {
        self.flush_region()?;
        writeln!(self.out, "{pos_org:>12} {pos_new:>12} EOF")?;
        self.out.flush()
    }

    fn counters(&self) -> &SinkCounters {
        &self.counters
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
