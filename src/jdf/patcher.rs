// Patch applier: source + patch → destination.
//
// The patch is read through the byte-source abstraction like any input, so
// it can come from a file or a pipe. Source bytes replayed by EQL are
// copied straight out of the source window when possible; BKT moves the
// source cursor backwards, which the window's scrollback handles.
//
// The operator state machine mirrors the writer's framing exactly,
// including its dark corners: an implicit MOD at stream start and after
// length operators, `ESC ESC` unescaping in both states, an `ESC` before a
// non-opcode byte passing both through as data, and an `ESC` introducing
// the operator already open being data as well. A lone `ESC` at end of
// stream — in either state — terminates cleanly; bytes after it are
// counted as a warning, not an error.

use std::io::{self, Write};

use super::{Op, ESC};
use crate::source::{ByteSource, Fetched, ReadMode, SourceError};

/// Applier failure.
#[derive(Debug)]
pub enum ApplyError {
    /// Malformed patch framing.
    Corrupt(&'static str),
    /// A length that does not fit 63-bit offsets.
    UnsupportedLength,
    /// Reading the source failed.
    Source(SourceError),
    /// Reading the patch failed.
    Patch(SourceError),
    /// Writing the output failed.
    Write(io::Error),
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Corrupt(what) => write!(f, "corrupt patch: {what}"),
            Self::UnsupportedLength => write!(f, "corrupt patch: 64-bit length not supported"),
            Self::Source(e) => write!(f, "source: {e}"),
            Self::Patch(e) => write!(f, "patch: {e}"),
            Self::Write(e) => write!(f, "write error: {e}"),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) | Self::Patch(e) => Some(e),
            Self::Write(e) => Some(e),
            _ => None,
        }
    }
}

/// Byte totals of an applied patch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyStats {
    /// Bytes written to the output.
    pub output: u64,
    /// Bytes replayed from the source by EQL.
    pub equal: u64,
    /// MOD data bytes.
    pub modified: u64,
    /// INS data bytes.
    pub inserted: u64,
    /// Source bytes skipped by DEL.
    pub deleted: u64,
    /// Source bytes rewound by BKT.
    pub backtracked: u64,
    /// Bytes found after the stream terminator (recoverable warning).
    pub trailing: u64,
}

/// How a data sequence ended.
enum SeqEnd {
    NextOp(Op),
    /// End of stream; `terminated` says whether the final ESC was seen.
    Stream { terminated: bool },
}

/// Apply a patch to a source, writing the destination to `out`.
pub fn apply<O, P, W>(org: &mut O, patch: &mut P, out: &mut W) -> Result<ApplyStats, ApplyError>
where
    O: ByteSource + ?Sized,
    P: ByteSource + ?Sized,
    W: Write,
{
    let mut stats = ApplyStats::default();
    let mut pos_org: i64 = 0;
    let mut pos_pch: i64 = 0;

    let mut next_op: Option<Op> = None;
    loop {
        let (op, pnd1, pnd2) = match next_op.take() {
            Some(op) => (op, None, None),
            None => {
                let b = match pget(patch, &mut pos_pch)? {
                    None => break,
                    Some(b) => b,
                };
                if b == ESC {
                    match pget(patch, &mut pos_pch)? {
                        // Lone ESC: stream terminator.
                        None => break,
                        Some(d) => match Op::from_byte(d) {
                            Some(op) => (op, None, None),
                            // ESC ESC or ESC <xxx> opening a sequence:
                            // implicit MOD with both bytes pending.
                            None => (Op::Mod, Some(ESC), Some(d)),
                        },
                    }
                } else {
                    // Implicit MOD.
                    (Op::Mod, Some(b), None)
                }
            }
        };

        match op {
            Op::Mod | Op::Ins => {
                let (count, end) = data_sequence(patch, &mut pos_pch, out, op, pnd1, pnd2)?;
                if op == Op::Mod {
                    stats.modified += count as u64;
                    pos_org += count;
                } else {
                    stats.inserted += count as u64;
                }
                stats.output += count as u64;
                match end {
                    SeqEnd::NextOp(op) => next_op = Some(op),
                    SeqEnd::Stream { terminated } => {
                        if !terminated {
                            // Data ran out without the final ESC: the last
                            // bytes may be stray. Recoverable.
                            stats.trailing += 1;
                        }
                        break;
                    }
                }
            }
            Op::Del => {
                let n = read_len(patch, &mut pos_pch)?;
                pos_org += n;
                stats.deleted += n as u64;
            }
            Op::Eql => {
                let n = read_len(patch, &mut pos_pch)?;
                copy_from(org, out, pos_org, n)?;
                pos_org += n;
                stats.equal += n as u64;
                stats.output += n as u64;
            }
            Op::Bkt => {
                let n = read_len(patch, &mut pos_pch)?;
                if n > pos_org {
                    return Err(ApplyError::Corrupt("backtrack before start of source"));
                }
                pos_org -= n;
                stats.backtracked += n as u64;
            }
        }
    }

    out.flush().map_err(ApplyError::Write)?;
    Ok(stats)
}

/// Apply an in-memory patch to an in-memory source.
pub fn apply_bytes(source: &[u8], patch: &[u8]) -> Result<Vec<u8>, ApplyError> {
    use crate::source::AheadFile;
    use std::io::Cursor;

    let mut org = AheadFile::new(Cursor::new(source.to_vec()), 256 * 1024, 4096, false)
        .map_err(|_| ApplyError::Corrupt("source buffer allocation failed"))?;
    let mut pch = AheadFile::new(Cursor::new(patch.to_vec()), 256 * 1024, 4096, false)
        .map_err(|_| ApplyError::Corrupt("patch buffer allocation failed"))?;
    let mut out = Vec::new();
    apply(&mut org, &mut pch, &mut out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

/// Next patch byte, or `None` at end of stream.
fn pget<P>(patch: &mut P, pos: &mut i64) -> Result<Option<u8>, ApplyError>
where
    P: ByteSource + ?Sized,
{
    match patch.get(*pos, ReadMode::Blocking).map_err(ApplyError::Patch)? {
        Fetched::Byte(b) => {
            *pos += 1;
            Ok(Some(b))
        }
        Fetched::Eof | Fetched::Eob => Ok(None),
    }
}

/// Read an operator length.
fn read_len<P>(patch: &mut P, pos: &mut i64) -> Result<i64, ApplyError>
where
    P: ByteSource + ?Sized,
{
    let need = |patch: &mut P, pos: &mut i64| -> Result<u64, ApplyError> {
        pget(patch, pos)?
            .map(u64::from)
            .ok_or(ApplyError::Corrupt("truncated length"))
    };

    let first = need(patch, pos)?;
    let wide = |width: usize, patch: &mut P, pos: &mut i64| -> Result<u64, ApplyError> {
        let mut v: u64 = 0;
        for _ in 0..width {
            v = (v << 8) | need(patch, pos)?;
        }
        v.checked_add(253 + 256)
            .ok_or(ApplyError::UnsupportedLength)
    };

    let val = match first {
        0..=251 => first + 1,
        252 => 253 + need(patch, pos)?,
        253 => wide(2, patch, pos)?,
        254 => wide(4, patch, pos)?,
        255 => wide(8, patch, pos)?,
        _ => unreachable!(),
    };
    i64::try_from(val).map_err(|_| ApplyError::UnsupportedLength)
}

/// Read one MOD/INS data sequence, writing its bytes to `out`.
///
/// `pnd1`/`pnd2` are bytes already consumed by the operator scanner:
/// `ESC ESC` yields one data ESC, `ESC <xxx>` both bytes verbatim.
fn data_sequence<P, W>(
    patch: &mut P,
    pos: &mut i64,
    out: &mut W,
    op: Op,
    pnd1: Option<u8>,
    pnd2: Option<u8>,
) -> Result<(i64, SeqEnd), ApplyError>
where
    P: ByteSource + ?Sized,
    W: Write,
{
    let mut count: i64 = 0;
    let put = |out: &mut W, b: u8, count: &mut i64| -> Result<(), ApplyError> {
        out.write_all(&[b]).map_err(ApplyError::Write)?;
        *count += 1;
        Ok(())
    };

    if let Some(p1) = pnd1 {
        put(out, p1, &mut count)?;
        if p1 == ESC && pnd2 != Some(ESC) {
            if let Some(p2) = pnd2 {
                put(out, p2, &mut count)?;
            }
        }
    }

    loop {
        let b = match pget(patch, pos)? {
            None => return Ok((count, SeqEnd::Stream { terminated: false })),
            Some(b) => b,
        };
        if b != ESC {
            put(out, b, &mut count)?;
            continue;
        }

        let d = match pget(patch, pos)? {
            // ESC then end of stream: clean terminator.
            None => return Ok((count, SeqEnd::Stream { terminated: true })),
            Some(d) => d,
        };
        if d == ESC {
            // Doubled ESC: one data byte.
            put(out, ESC, &mut count)?;
        } else {
            match Op::from_byte(d) {
                Some(new_op) if new_op != op => return Ok((count, SeqEnd::NextOp(new_op))),
                Some(_) => {
                    // ESC MOD inside MOD (or INS inside INS) carries no
                    // meaning: both bytes are data.
                    put(out, ESC, &mut count)?;
                    put(out, d, &mut count)?;
                }
                None => {
                    // ESC before a non-opcode: both bytes verbatim.
                    put(out, ESC, &mut count)?;
                    put(out, d, &mut count)?;
                }
            }
        }
    }
}

/// Replay `len` source bytes from `pos` to the output, window-bulk when
/// possible, byte-wise otherwise.
fn copy_from<O, W>(org: &mut O, out: &mut W, pos: i64, len: i64) -> Result<(), ApplyError>
where
    O: ByteSource + ?Sized,
    W: Write,
{
    let mut pos = pos;
    let mut len = len;
    while len > 0 {
        let buf = org
            .get_buf(pos, ReadMode::Blocking)
            .map_err(ApplyError::Source)?;
        if buf.is_empty() {
            // EOF (or a window the mode cannot reach): the patch asks for
            // source bytes that do not exist.
            return Err(ApplyError::Corrupt("EQL past end of source"));
        }
        let take = (buf.len() as i64).min(len) as usize;
        out.write_all(&buf[..take]).map_err(ApplyError::Write)?;
        pos += take as i64;
        len -= take as i64;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
