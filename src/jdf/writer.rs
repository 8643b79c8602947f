// Patch output: the sink trait and the binary JDF writer.
//
// The differ drives a sink one operator at a time. EQL handling is split
// between driver and sink: the sink keeps the first bytes of a fresh equal
// run in reserve and tells the driver (return value `true`) once the run is
// long enough to be counted instead of replayed per byte. A run that dies
// at one or two bytes is cheaper on the wire as MOD data (two data bytes)
// than as an EQL operator (escape, opcode, length), so the reserve is
// flushed as data in that case.

use std::io::{self, Write};

use super::lengths;
use super::{Op, ESC};

/// Equal bytes kept in reserve before committing to an EQL run.
const MIN_EQL: i64 = 2;

/// Byte counters of an emitted patch, by operator class.
///
/// `equal` counts destination bytes covered by equal runs (including short
/// runs flushed as data); `data` counts real MOD/INS payload bytes. A patch
/// of two identical streams has `data == 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkCounters {
    pub equal: i64,
    pub data: i64,
    pub control: i64,
    pub escape: i64,
    pub delete: i64,
    pub backtrack: i64,
}

/// Receiver for the differ's operator stream.
pub trait PatchSink {
    /// Emit one operator.
    ///
    /// For `Eql` with `len == 1` the return value says whether the sink has
    /// committed to an equal run, in which case the driver may accumulate
    /// further equal bytes itself and flush them as one `Eql` with the
    /// total length. Other operators return `false`.
    fn put(
        &mut self,
        op: Op,
        len: i64,
        org: Option<u8>,
        new: Option<u8>,
        pos_org: i64,
        pos_new: i64,
    ) -> io::Result<bool>;

    /// Terminate the stream.
    fn finish(&mut self, pos_org: i64, pos_new: i64) -> io::Result<()>;

    /// Emitted byte counters.
    fn counters(&self) -> &SinkCounters;
}

// ---------------------------------------------------------------------------
// Binary writer
// ---------------------------------------------------------------------------

/// Data context: which operator the next raw data byte belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataCtx {
    /// No open data sequence; a plain data byte starts an implicit MOD.
    None,
    Mod,
    Ins,
}

/// Writes the compact binary patch format.
pub struct BinaryPatchWriter<W: Write> {
    out: W,
    counters: SinkCounters,
    ctx: DataCtx,

    /// Pending equal bytes not yet on the wire.
    pending_eql: i64,
    /// Values of the first two pending equal bytes.
    reserve: [u8; 2],
    reserved: usize,
}

impl<W: Write> BinaryPatchWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            counters: SinkCounters::default(),
            ctx: DataCtx::None,
            pending_eql: 0,
            reserve: [0; 2],
            reserved: 0,
        }
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_op(&mut self, op: Op) -> io::Result<()> {
        self.out.write_all(&[ESC, op.byte()])?;
        self.counters.control += 2;
        Ok(())
    }

    /// Write one data byte in the given context, escaping literal ESCs and
    /// opening the operator sequence if needed.
    fn emit_data(&mut self, ctx: DataCtx, b: u8) -> io::Result<()> {
        if self.ctx != ctx {
            match ctx {
                // At the start of the stream or after a length-bearing
                // operator, MOD is implicit.
                DataCtx::Mod if self.ctx == DataCtx::None => {}
                DataCtx::Mod => self.write_op(Op::Mod)?,
                DataCtx::Ins => self.write_op(Op::Ins)?,
                DataCtx::None => unreachable!("data in no context"),
            }
            self.ctx = ctx;
        }
        if b == ESC {
            self.out.write_all(&[ESC, ESC])?;
            self.counters.escape += 1;
        } else {
            self.out.write_all(&[b])?;
        }
        Ok(())
    }

    /// Emit pending equal bytes: short runs as MOD data, real runs as EQL.
    fn flush_pending(&mut self) -> io::Result<()> {
        if self.pending_eql == 0 {
            return Ok(());
        }
        let n = self.pending_eql;
        self.pending_eql = 0;

        if n <= MIN_EQL && self.reserved as i64 >= n {
            let bytes = self.reserve;
            for &b in bytes.iter().take(n as usize) {
                self.emit_data(DataCtx::Mod, b)?;
            }
        } else {
            self.write_op(Op::Eql)?;
            let k = lengths::write_len(&mut self.out, n as u64)?;
            self.counters.control += k as i64;
            self.ctx = DataCtx::None;
        }
        self.counters.equal += n;
        self.reserved = 0;
        Ok(())
    }
}

impl<W: Write> PatchSink for BinaryPatchWriter<W> {
    fn put(
        &mut self,
        op: Op,
        len: i64,
        org: Option<u8>,
        new: Option<u8>,
        _pos_org: i64,
        _pos_new: i64,
    ) -> io::Result<bool> {
        match op {
            Op::Eql => {
                if len == 1 {
                    if self.reserved < 2 {
                        if let Some(b) = new.or(org) {
                            self.reserve[self.reserved] = b;
                            self.reserved += 1;
                        }
                    }
                    self.pending_eql += 1;
                    Ok(self.pending_eql > MIN_EQL)
                } else {
                    self.pending_eql += len;
                    Ok(true)
                }
            }
            Op::Mod => {
                self.flush_pending()?;
                let b = new.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "MOD without data byte")
                })?;
                self.emit_data(DataCtx::Mod, b)?;
                self.counters.data += 1;
                Ok(false)
            }
            Op::Ins => {
                self.flush_pending()?;
                let b = new.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "INS without data byte")
                })?;
                self.emit_data(DataCtx::Ins, b)?;
                self.counters.data += 1;
                Ok(false)
            }
            Op::Del => {
                self.flush_pending()?;
                self.write_op(Op::Del)?;
                let k = lengths::write_len(&mut self.out, len as u64)?;
                self.counters.control += k as i64;
                self.counters.delete += len;
                self.ctx = DataCtx::None;
                Ok(false)
            }
            Op::Bkt => {
                self.flush_pending()?;
                self.write_op(Op::Bkt)?;
                let k = lengths::write_len(&mut self.out, len as u64)?;
                self.counters.control += k as i64;
                self.counters.backtrack += len;
                self.ctx = DataCtx::None;
                Ok(false)
            }
        }
    }

    fn finish(&mut self, _pos_org: i64, _pos_new: i64) -> io::Result<()> {
        self.flush_pending()?;
        self.out.write_all(&[ESC])?;
        self.counters.control += 1;
        self.out.flush()
    }

    fn counters(&self) -> &SinkCounters {
        &self.counters
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdf::{BKT, DEL, EQL, INS, MOD};

    fn writer() -> BinaryPatchWriter<Vec<u8>> {
        BinaryPatchWriter::new(Vec::new())
    }

    #[test]
    fn implicit_mod_at_stream_start() {
        let mut w = writer();
        w.put(Op::Mod, 1, Some(b'a'), Some(b'x'), 0, 0).unwrap();
        w.put(Op::Mod, 1, Some(b'b'), Some(b'y'), 1, 1).unwrap();
        w.finish(2, 2).unwrap();
        let out = w.into_inner().unwrap();
        // No ESC MOD prefix: data starts the sequence.
        assert_eq!(out, vec![b'x', b'y', ESC]);
    }

    #[test]
    fn ins_needs_explicit_opcode() {
        let mut w = writer();
        w.put(Op::Ins, 1, None, Some(b'z'), 0, 0).unwrap();
        w.finish(0, 1).unwrap();
        let out = w.into_inner().unwrap();
        assert_eq!(out, vec![ESC, INS, b'z', ESC]);
    }

    #[test]
    fn esc_byte_in_data_is_doubled() {
        let mut w = writer();
        w.put(Op::Mod, 1, Some(0), Some(ESC), 0, 0).unwrap();
        w.finish(1, 1).unwrap();
        assert_eq!(w.counters().escape, 1);
        let out = w.into_inner().unwrap();
        // ESC ESC (data) + ESC (terminator).
        assert_eq!(out, vec![ESC, ESC, ESC]);
    }

    #[test]
    fn long_equal_run_becomes_eql_op() {
        let mut w = writer();
        let mut committed = false;
        for i in 0..3 {
            committed = w.put(Op::Eql, 1, Some(7), Some(7), i, i).unwrap();
        }
        assert!(committed, "third equal byte must commit the run");
        w.put(Op::Eql, 97, None, None, 3, 3).unwrap();
        w.finish(100, 100).unwrap();
        assert_eq!(w.counters().equal, 100);
        assert_eq!(w.counters().data, 0);
        let out = w.into_inner().unwrap();
        assert_eq!(out, vec![ESC, EQL, 99, ESC]); // 100 encoded as 99
    }

    #[test]
    fn short_equal_run_flushes_as_data() {
        let mut w = writer();
        // One equal byte, then a difference: cheaper as MOD data.
        let committed = w.put(Op::Eql, 1, Some(b'k'), Some(b'k'), 0, 0).unwrap();
        assert!(!committed);
        w.put(Op::Mod, 1, Some(b'a'), Some(b'b'), 1, 1).unwrap();
        w.finish(2, 2).unwrap();
        assert_eq!(w.counters().equal, 1);
        assert_eq!(w.counters().data, 1);
        let out = w.into_inner().unwrap();
        assert_eq!(out, vec![b'k', b'b', ESC]);
    }

    #[test]
    fn del_and_bkt_carry_lengths() {
        let mut w = writer();
        w.put(Op::Del, 300, None, None, 0, 0).unwrap();
        w.put(Op::Bkt, 5, None, None, 300, 0).unwrap();
        w.finish(295, 0).unwrap();
        assert_eq!(w.counters().delete, 300);
        assert_eq!(w.counters().backtrack, 5);
        let out = w.into_inner().unwrap();
        // 300 − 253 = 47 in the 8-bit extended length form.
        assert_eq!(out, vec![ESC, DEL, 252, 47, ESC, BKT, 4, ESC]);
    }

    #[test]
    fn mod_after_length_op_is_implicit_again() {
        let mut w = writer();
        w.put(Op::Mod, 1, None, Some(b'p'), 0, 0).unwrap();
        w.put(Op::Del, 10, None, None, 1, 1).unwrap();
        w.put(Op::Mod, 1, None, Some(b'q'), 11, 1).unwrap();
        w.finish(12, 2).unwrap();
        let out = w.into_inner().unwrap();
        assert_eq!(out, vec![b'p', ESC, DEL, 9, b'q', ESC]);
    }

    #[test]
    fn ins_to_mod_transition_is_explicit() {
        let mut w = writer();
        w.put(Op::Ins, 1, None, Some(b'i'), 0, 0).unwrap();
        w.put(Op::Mod, 1, Some(b'x'), Some(b'm'), 0, 1).unwrap();
        w.finish(1, 2).unwrap();
        let out = w.into_inner().unwrap();
        assert_eq!(out, vec![ESC, INS, b'i', ESC, MOD, b'm', ESC]);
    }

    #[test]
    fn empty_patch_is_lone_terminator() {
        let mut w = writer();
        w.finish(0, 0).unwrap();
        let out = w.into_inner().unwrap();
        assert_eq!(out, vec![ESC]);
    }
}
