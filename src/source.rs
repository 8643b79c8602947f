// Buffered random-access byte source.
//
// The differ reads its two inputs through a large sliding window with three
// read modes:
//   - **Blocking**: may perform I/O and evict window contents.
//   - **HardAhead**: may perform I/O, but refuses reads a sequential input
//     cannot reach (before the window).
//   - **SoftAhead**: never performs I/O past the window limit derived from
//     the lookahead base; reports `Eob` instead.
//
// The window is a circular buffer aligned on a configurable block size.
// Reading slightly before the window start scrolls the window back instead
// of discarding it, so the search algorithm can come back to its base
// position for byte comparisons after reading far ahead.

use std::collections::TryReserveError;
use std::io::{self, Read, Seek, SeekFrom};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Read mode for `ByteSource::get` and `ByteSource::get_buf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Normal read: may do I/O, may evict any part of the window.
    Blocking,
    /// Lookahead read: may do I/O, fails where a backward read is impossible.
    HardAhead,
    /// Buffered lookahead: never reads past the window, returns `Eob`.
    SoftAhead,
}

/// Outcome of a single-byte read.
///
/// A sum type instead of the classic negative sentinels, so end-of-buffer
/// can never be mistaken for data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    /// One byte of data.
    Byte(u8),
    /// End of file.
    Eof,
    /// End of buffer: the data is not available under the current mode.
    Eob,
}

impl Fetched {
    /// The byte, if any.
    #[inline]
    pub fn byte(self) -> Option<u8> {
        match self {
            Fetched::Byte(b) => Some(b),
            _ => None,
        }
    }
}

/// I/O failure of a byte source.
#[derive(Debug)]
pub enum SourceError {
    /// Seek failed (or was attempted on a sequential input).
    Seek(io::Error),
    /// Read failed.
    Read(io::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seek(e) => write!(f, "seek error: {e}"),
            Self::Read(e) => write!(f, "read error: {e}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Seek(e) | Self::Read(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// The byte source contract
// ---------------------------------------------------------------------------

/// Random-access byte reader with a sliding window.
///
/// Positions are absolute byte offsets. Implementations keep a window of
/// recently read data; `SoftAhead` reads are answered from the window only.
pub trait ByteSource {
    /// Read one byte at `pos`.
    fn get(&mut self, pos: i64, mode: ReadMode) -> Result<Fetched, SourceError>;

    /// Bulk access to the window at `pos`.
    ///
    /// Returns the longest contiguous in-window slice starting at `pos`; an
    /// empty slice means the position is not reachable (EOF or EOB) — use
    /// `get` to find out which.
    fn get_buf(&mut self, pos: i64, mode: ReadMode) -> Result<&[u8], SourceError>;

    /// Set the lookahead base: soft reads past `base + buffer_size −
    /// block_size` return `Eob`.
    fn set_lookahead_base(&mut self, base: i64);

    /// Whether the underlying input only supports forward reads.
    fn is_sequential(&self) -> bool;

    /// Number of seek operations performed so far.
    fn seek_count(&self) -> u64;

    /// First position currently held in the window.
    fn buffer_start(&self) -> i64;

    /// Total window capacity in bytes.
    fn buffer_size(&self) -> i64;
}

// ---------------------------------------------------------------------------
// Sequential input adapter
// ---------------------------------------------------------------------------

/// Wraps a forward-only reader (stdin, a pipe) so it can feed an
/// [`AheadFile`] declared sequential. Seeking is refused; the sequential
/// window logic never attempts it.
pub struct SeqInput<R: Read>(pub R);

impl<R: Read> Read for SeqInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> Seek for SeqInput<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "seek on sequential input",
        ))
    }
}

// ---------------------------------------------------------------------------
// Buffered implementation
// ---------------------------------------------------------------------------

/// What the window logic decided to do for an out-of-window request.
enum WindowOp {
    Append,
    Reset,
    Scrollback,
}

/// Where a position was located.
enum Located {
    /// Window index and contiguous length available from it.
    At(usize, i64),
    Eof,
    Eob,
}

/// Circular-buffer byte source over any `Read + Seek`.
///
/// The window is `[pos_top − used, pos_top)`; `inp` is the buffer index
/// where the next byte from the file lands. Reads happen in whole blocks.
pub struct AheadFile<R: Read + Seek> {
    reader: R,
    seq: bool,

    buf: Vec<u8>,
    buf_size: i64,
    block_size: i64,

    /// Bytes currently valid in the window.
    used: i64,
    /// Buffer index of the write cursor.
    inp: usize,
    /// File position of the write cursor (window top).
    pos_top: i64,
    /// Base position for soft lookahead.
    base: i64,
    /// Discovered end-of-file position (`i64::MAX` until known).
    eof_pos: i64,

    seeks: u64,

    // Fast path for sequential `get` calls.
    red_pos: i64,
    red_idx: usize,
    red_len: i64,
}

impl<R: Read + Seek> AheadFile<R> {
    /// Create a buffered source.
    ///
    /// `buf_size` is silently aligned down to a multiple of `block_size`
    /// (minimum one block); a zero block size becomes one byte.
    pub fn new(
        reader: R,
        buf_size: i64,
        block_size: i64,
        seq: bool,
    ) -> Result<Self, TryReserveError> {
        let block_size = block_size.max(1);
        let mut buf_size = if buf_size <= 0 { 1024 } else { buf_size };
        buf_size -= buf_size % block_size;
        if buf_size == 0 {
            buf_size = block_size;
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(buf_size as usize)?;
        buf.resize(buf_size as usize, 0);

        Ok(Self {
            reader,
            seq,
            buf,
            buf_size,
            block_size,
            used: 0,
            inp: 0,
            pos_top: 0,
            base: 0,
            eof_pos: i64::MAX,
            seeks: 0,
            red_pos: -1,
            red_idx: 0,
            red_len: 0,
        })
    }

    /// Consume the source, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn jseek(&mut self, pos: i64) -> Result<(), SourceError> {
        self.reader
            .seek(SeekFrom::Start(pos as u64))
            .map(|_| ())
            .map_err(SourceError::Seek)?;
        self.seeks += 1;
        Ok(())
    }

    /// Fill `self.buf[idx..]` in blocks until the file position passes
    /// `end`. Returns the new (index, position) pair and whether `end`
    /// turned out to lie at or past EOF.
    fn read_blocks(
        &mut self,
        mut idx: usize,
        mut pos: i64,
        end: i64,
    ) -> Result<(usize, i64, bool), SourceError> {
        while pos <= end {
            let mut todo = self.block_size as usize;
            if idx == self.buf.len() {
                idx = 0;
            } else if self.buf.len() - idx < todo {
                todo = self.buf.len() - idx;
            }

            let done = read_full(&mut self.reader, &mut self.buf[idx..idx + todo])
                .map_err(SourceError::Read)?;

            idx += done;
            pos += done as i64;
            self.used += done as i64;

            if done < todo {
                self.eof_pos = pos;
                if self.used > self.buf_size {
                    self.used = self.buf_size;
                }
                return Ok((idx, pos, end >= self.eof_pos));
            }
        }
        if self.used > self.buf_size {
            self.used = self.buf_size;
        }
        Ok((idx, pos, false))
    }

    /// Bring `pos` into the window, reading from the file.
    fn fetch(&mut self, pos: i64, mode: ReadMode) -> Result<Option<Located>, SourceError> {
        // The window is about to change: drop the fast-read cache.
        self.red_pos = -1;
        self.red_len = 0;

        let op = if pos < self.pos_top - self.used {
            // Reading before the window start.
            if mode == ReadMode::SoftAhead {
                return Ok(Some(Located::Eob));
            } else if self.seq {
                return if mode == ReadMode::HardAhead {
                    Ok(Some(Located::Eob))
                } else {
                    Err(SourceError::Seek(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "backward read on sequential input",
                    )))
                };
            } else if pos + self.buf_size - self.block_size > self.pos_top - self.used {
                WindowOp::Scrollback
            } else {
                WindowOp::Reset
            }
        } else if pos >= self.pos_top + self.buf_size {
            // Advancing by more than the window size.
            if mode == ReadMode::SoftAhead {
                return Ok(Some(Located::Eob));
            }
            WindowOp::Reset
        } else {
            if mode == ReadMode::SoftAhead && pos > self.base + self.buf_size - self.block_size {
                return Ok(Some(Located::Eob));
            }
            WindowOp::Append
        };

        match op {
            WindowOp::Append => {
                let (idx, top, eof) = self.read_blocks(self.inp, self.pos_top, pos)?;
                self.inp = idx;
                self.pos_top = top;
                if eof {
                    return Ok(Some(Located::Eof));
                }
            }

            WindowOp::Reset if !self.seq => {
                self.pos_top = (pos / self.block_size) * self.block_size;
                self.inp = 0;
                self.base = self.pos_top;
                self.used = 0;
                self.jseek(self.pos_top)?;
                let (idx, top, eof) = self.read_blocks(0, self.pos_top, pos)?;
                self.inp = idx;
                self.pos_top = top;
                if eof {
                    return Ok(Some(Located::Eof));
                }
            }

            WindowOp::Reset => {
                // Sequential: jump forward by reading through, keeping the
                // last window-size bytes.
                let (idx, top, eof) = self.read_blocks(self.inp, self.pos_top, pos)?;
                self.inp = idx;
                self.pos_top = top;
                if eof {
                    return Ok(Some(Located::Eof));
                }
            }

            WindowOp::Scrollback => {
                let target = (pos / self.block_size) * self.block_size;
                let span = self.pos_top - target;
                // Circular index of `target`; span may exceed the buffer
                // size by up to one window.
                let idx = (self.inp as i64 - span).rem_euclid(self.buf_size);

                if span > self.buf_size {
                    // The top of the window has to go to make room.
                    let cut = span - self.buf_size;
                    self.used -= cut;
                    self.pos_top = target + self.buf_size;
                    self.inp = idx as usize;
                }

                let end = self.pos_top - self.used - 1;
                self.jseek(target)?;
                let (_, _, eof) = self.read_blocks(idx as usize, target, end)?;
                if eof {
                    // Scrolling back over data we already read can only hit
                    // EOF if the file is being truncated under us.
                    return Err(SourceError::Read(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "file shrank during scrollback",
                    )));
                }
                self.jseek(self.pos_top)?;
            }
        }

        Ok(None)
    }

    /// Locate `pos` in the window, filling from the file when needed.
    fn locate(&mut self, pos: i64, mode: ReadMode) -> Result<Located, SourceError> {
        if pos >= self.eof_pos {
            return Ok(Located::Eof);
        }
        if !(pos < self.pos_top && pos >= self.pos_top - self.used) {
            if let Some(out) = self.fetch(pos, mode)? {
                return Ok(out);
            }
        }

        // Translate the position into a buffer index and contiguous length.
        let back = self.pos_top - pos;
        let (idx, avail) = if back <= self.inp as i64 {
            (self.inp - back as usize, back)
        } else {
            let idx = (self.inp as i64 + self.buf_size - back) as usize;
            (idx, self.buf.len() as i64 - idx as i64)
        };
        Ok(Located::At(idx, avail))
    }
}

impl<R: Read + Seek> ByteSource for AheadFile<R> {
    #[inline]
    fn get(&mut self, pos: i64, mode: ReadMode) -> Result<Fetched, SourceError> {
        // Fast path: the byte after the last one read.
        if pos == self.red_pos && self.red_len > 0 {
            let b = self.buf[self.red_idx];
            self.red_pos += 1;
            self.red_len -= 1;
            self.red_idx += 1;
            if self.red_idx == self.buf.len() {
                self.red_idx = 0;
            }
            return Ok(Fetched::Byte(b));
        }

        match self.locate(pos, mode)? {
            Located::At(idx, avail) => {
                self.red_pos = pos + 1;
                self.red_len = avail - 1;
                self.red_idx = idx + 1;
                if self.red_idx == self.buf.len() {
                    self.red_idx = 0;
                }
                Ok(Fetched::Byte(self.buf[idx]))
            }
            Located::Eof => {
                self.red_pos = -1;
                self.red_len = 0;
                Ok(Fetched::Eof)
            }
            Located::Eob => {
                self.red_pos = -1;
                self.red_len = 0;
                Ok(Fetched::Eob)
            }
        }
    }

    fn get_buf(&mut self, pos: i64, mode: ReadMode) -> Result<&[u8], SourceError> {
        match self.locate(pos, mode)? {
            Located::At(idx, avail) => Ok(&self.buf[idx..idx + avail as usize]),
            Located::Eof | Located::Eob => Ok(&[]),
        }
    }

    fn set_lookahead_base(&mut self, base: i64) {
        self.base = base;
    }

    fn is_sequential(&self) -> bool {
        self.seq
    }

    fn seek_count(&self) -> u64 {
        self.seeks
    }

    fn buffer_start(&self) -> i64 {
        self.pos_top - self.used
    }

    fn buffer_size(&self) -> i64 {
        self.buf_size
    }
}

/// Read until `buf` is full or EOF. Returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match reader.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn file(data: &[u8], buf: i64, blk: i64) -> AheadFile<Cursor<Vec<u8>>> {
        AheadFile::new(Cursor::new(data.to_vec()), buf, blk, false).unwrap()
    }

    #[test]
    fn sequential_read_matches_data() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut f = file(&data, 256, 64);
        for (i, &b) in data.iter().enumerate() {
            assert_eq!(
                f.get(i as i64, ReadMode::Blocking).unwrap(),
                Fetched::Byte(b),
                "mismatch at {i}"
            );
        }
        assert_eq!(f.get(1000, ReadMode::Blocking).unwrap(), Fetched::Eof);
    }

    #[test]
    fn eof_is_sticky() {
        let mut f = file(b"abc", 64, 16);
        assert_eq!(f.get(10, ReadMode::Blocking).unwrap(), Fetched::Eof);
        assert_eq!(f.get(3, ReadMode::Blocking).unwrap(), Fetched::Eof);
        assert_eq!(f.get(2, ReadMode::Blocking).unwrap(), Fetched::Byte(b'c'));
    }

    #[test]
    fn random_access_after_lookahead() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        let mut f = file(&data, 512, 64);
        // Read far ahead, then come back to the start of the window.
        assert_eq!(
            f.get(2000, ReadMode::Blocking).unwrap(),
            Fetched::Byte(data[2000])
        );
        let start = f.buffer_start();
        assert_eq!(
            f.get(start, ReadMode::Blocking).unwrap(),
            Fetched::Byte(data[start as usize])
        );
    }

    #[test]
    fn scrollback_reads_before_window() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        let mut f = file(&data, 512, 64);
        assert_eq!(
            f.get(1024, ReadMode::Blocking).unwrap(),
            Fetched::Byte(data[1024])
        );
        let start = f.buffer_start();
        // Just before the window: triggers a scrollback, not a full reset.
        let pos = start - 10;
        assert_eq!(
            f.get(pos, ReadMode::Blocking).unwrap(),
            Fetched::Byte(data[pos as usize])
        );
        // The data read ahead earlier is still reachable.
        assert_eq!(
            f.get(1024, ReadMode::Blocking).unwrap(),
            Fetched::Byte(data[1024])
        );
    }

    #[test]
    fn soft_ahead_respects_base() {
        let data = vec![0x55u8; 8192];
        let mut f = file(&data, 512, 64);
        f.set_lookahead_base(0);
        // Within base + buf − blk: fine.
        assert_eq!(
            f.get(100, ReadMode::SoftAhead).unwrap(),
            Fetched::Byte(0x55)
        );
        // Beyond it: end of buffer.
        assert_eq!(f.get(512, ReadMode::SoftAhead).unwrap(), Fetched::Eob);
        // Moving the base forward opens the range up.
        f.set_lookahead_base(512);
        assert_eq!(
            f.get(512, ReadMode::HardAhead).unwrap(),
            Fetched::Byte(0x55)
        );
        assert_eq!(
            f.get(700, ReadMode::SoftAhead).unwrap(),
            Fetched::Byte(0x55)
        );
    }

    #[test]
    fn soft_ahead_never_reads_before_window() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 256) as u8).collect();
        let mut f = file(&data, 512, 64);
        f.get(3000, ReadMode::Blocking).unwrap();
        let start = f.buffer_start();
        assert_eq!(f.get(start - 1, ReadMode::SoftAhead).unwrap(), Fetched::Eob);
    }

    #[test]
    fn sequential_refuses_backward_reads() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 256) as u8).collect();
        let mut f =
            AheadFile::new(SeqInput(Cursor::new(data.clone())), 512, 64, true).unwrap();
        f.get(2000, ReadMode::Blocking).unwrap();
        let start = f.buffer_start();
        assert_eq!(
            f.get(start - 1, ReadMode::HardAhead).unwrap(),
            Fetched::Eob
        );
        assert!(f.get(start - 1, ReadMode::Blocking).is_err());
        // In-window reads still work.
        assert_eq!(
            f.get(start, ReadMode::Blocking).unwrap(),
            Fetched::Byte(data[start as usize])
        );
    }

    #[test]
    fn sequential_jump_forward() {
        let data: Vec<u8> = (0..8192).map(|i| (i % 253) as u8).collect();
        let mut f = AheadFile::new(SeqInput(Cursor::new(data.clone())), 512, 64, true).unwrap();
        // Far beyond the window: sequential reset reads through.
        assert_eq!(
            f.get(7000, ReadMode::Blocking).unwrap(),
            Fetched::Byte(data[7000])
        );
        assert_eq!(f.seek_count(), 0);
    }

    #[test]
    fn get_buf_returns_window_slice() {
        let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
        let mut f = file(&data, 256, 64);
        f.get(100, ReadMode::Blocking).unwrap();
        let buf = f.get_buf(50, ReadMode::Blocking).unwrap();
        assert!(!buf.is_empty());
        assert_eq!(buf[0], data[50]);
        let n = buf.len().min(20);
        assert_eq!(&buf[..n], &data[50..50 + n]);
    }

    #[test]
    fn get_buf_empty_past_eof() {
        let mut f = file(b"xyz", 64, 16);
        let buf = f.get_buf(3, ReadMode::Blocking).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn buffer_size_is_block_aligned() {
        let f = file(b"", 1000, 64);
        assert_eq!(f.buffer_size(), 960);
    }
}
