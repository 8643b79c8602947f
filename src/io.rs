// File-level helpers for diffing and patching.
//
// Wraps the engine and the applier with buffered file plumbing and maps
// every failure onto the tool's numeric exit codes. Optionally computes a
// streaming SHA-256 of what was written (feature-gated behind `file-io`).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::config::Tuning;
use crate::engine::{DiffError, DiffOptions, DiffStats, Differ};
use crate::jdf::patcher::{self, ApplyError, ApplyStats};
use crate::jdf::writer::{BinaryPatchWriter, PatchSink, SinkCounters};
use crate::source::{AheadFile, ByteSource, SeqInput, SourceError};

/// Standard input/output pseudo-path.
pub const STDIO_PATH: &str = "-";

// ---------------------------------------------------------------------------
// Errors and exit codes
// ---------------------------------------------------------------------------

/// Tool-level failure, carrying the numeric exit-code convention:
/// 0 ok, 1 ok with differences, 2 ok no differences; negative codes are
/// errors and the process exits with their magnitude.
#[derive(Debug)]
pub enum ToolError {
    Args(String),
    OpenSource(io::Error),
    OpenDest(io::Error),
    OpenOut(io::Error),
    Seek(io::Error),
    Read(io::Error),
    Write(io::Error),
    Memory,
    Unsupported64,
    Corrupt(&'static str),
    Other(String),
}

impl ToolError {
    /// The (negative) internal code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Args(_) => -2,
            Self::OpenSource(_) => -3,
            Self::OpenDest(_) => -4,
            Self::OpenOut(_) => -5,
            Self::Seek(_) => -6,
            Self::Unsupported64 => -7,
            Self::Read(_) => -8,
            Self::Write(_) => -9,
            Self::Memory => -10,
            Self::Corrupt(_) | Self::Other(_) => -20,
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Args(what) => write!(f, "argument error: {what}"),
            Self::OpenSource(e) => write!(f, "cannot open source file: {e}"),
            Self::OpenDest(e) => write!(f, "cannot open destination file: {e}"),
            Self::OpenOut(e) => write!(f, "cannot open output file: {e}"),
            Self::Seek(e) => write!(f, "seek error: {e}"),
            Self::Read(e) => write!(f, "read error: {e}"),
            Self::Write(e) => write!(f, "write error: {e}"),
            Self::Memory => write!(f, "memory allocation failed"),
            Self::Unsupported64 => write!(f, "64-bit offsets not supported"),
            Self::Corrupt(what) => write!(f, "corrupt patch: {what}"),
            Self::Other(what) => write!(f, "{what}"),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<DiffError> for ToolError {
    fn from(e: DiffError) -> Self {
        match e {
            DiffError::Source(SourceError::Seek(e)) => Self::Seek(e),
            DiffError::Source(SourceError::Read(e)) => Self::Read(e),
            DiffError::Sink(e) => Self::Write(e),
            DiffError::Alloc(_) => Self::Memory,
        }
    }
}

impl From<ApplyError> for ToolError {
    fn from(e: ApplyError) -> Self {
        match e {
            ApplyError::Corrupt(what) => Self::Corrupt(what),
            ApplyError::UnsupportedLength => Self::Unsupported64,
            ApplyError::Source(SourceError::Seek(e)) | ApplyError::Patch(SourceError::Seek(e)) => {
                Self::Seek(e)
            }
            ApplyError::Source(SourceError::Read(e)) | ApplyError::Patch(SourceError::Read(e)) => {
                Self::Read(e)
            }
            ApplyError::Write(e) => Self::Write(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Input / output plumbing
// ---------------------------------------------------------------------------

/// Which positional an input failure should be blamed on.
#[derive(Debug, Clone, Copy)]
pub enum InputRole {
    Source,
    Dest,
}

/// Open an input as a buffered byte source; `-` means standard input.
pub fn open_input(
    path: &Path,
    buf_size: i64,
    block_size: i64,
    seq: bool,
    role: InputRole,
) -> Result<Box<dyn ByteSource>, ToolError> {
    let open_err = |e| match role {
        InputRole::Source => ToolError::OpenSource(e),
        InputRole::Dest => ToolError::OpenDest(e),
    };

    if path.as_os_str() == STDIO_PATH {
        let file = AheadFile::new(SeqInput(io::stdin()), buf_size, block_size, true)
            .map_err(|_| ToolError::Memory)?;
        Ok(Box::new(file))
    } else {
        let f = File::open(path).map_err(open_err)?;
        let file =
            AheadFile::new(f, buf_size, block_size, seq).map_err(|_| ToolError::Memory)?;
        Ok(Box::new(file))
    }
}

/// Open the output; `-` or absent means standard output.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, ToolError> {
    match path {
        Some(p) if p.as_os_str() != STDIO_PATH => {
            let f = File::create(p).map_err(ToolError::OpenOut)?;
            Ok(Box::new(BufWriter::with_capacity(64 * 1024, f)))
        }
        _ => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Statistics of a completed diff run.
#[derive(Debug, Clone)]
pub struct DiffFileStats {
    /// Emitted byte counters by operator class.
    pub sink: SinkCounters,
    /// Engine counters.
    pub engine: DiffStats,
    /// Total patch bytes on the wire.
    pub patch_bytes: i64,
    /// Any MOD/INS data emitted?
    pub differences: bool,
    /// Seeks performed on each input.
    pub seeks_org: u64,
    pub seeks_new: u64,
    /// SHA-256 of the patch stream (with the `file-io` feature).
    pub patch_sha256: Option<[u8; 32]>,
}

/// Diff `source` against `dest`, writing a binary patch to `patch`
/// (standard output when `None`).
pub fn diff_files(
    source: &Path,
    dest: &Path,
    patch: Option<&Path>,
    tuning: &Tuning,
) -> Result<DiffFileStats, ToolError> {
    let mut t = tuning.clone();
    t.finish();

    if source.as_os_str() == STDIO_PATH && dest.as_os_str() == STDIO_PATH {
        return Err(ToolError::Args(
            "source and destination cannot both be standard input".into(),
        ));
    }

    let mut org = open_input(source, t.buf_org, t.block_size, t.seq_org, InputRole::Source)?;
    let mut new = open_input(dest, t.buf_new, t.block_size, t.seq_new, InputRole::Dest)?;
    let out = open_output(patch)?;

    #[cfg(feature = "file-io")]
    let (counters, engine, patch_sha256) = {
        let mut hasher = sha2::Sha256::new();
        let writer = HashingWriter {
            inner: out,
            hasher: &mut hasher,
        };
        let (counters, engine) = diff_into(org.as_mut(), new.as_mut(), writer, &t)?;
        (counters, engine, Some(hasher.finalize().into()))
    };

    #[cfg(not(feature = "file-io"))]
    let (counters, engine, patch_sha256) = {
        let (counters, engine) = diff_into(org.as_mut(), new.as_mut(), out, &t)?;
        (counters, engine, None)
    };

    Ok(DiffFileStats {
        sink: counters,
        engine,
        patch_bytes: counters.data + counters.control + counters.escape,
        differences: counters.data > 0,
        seeks_org: org.seek_count(),
        seeks_new: new.seek_count(),
        patch_sha256,
    })
}

/// Run one diff into a writer, returning sink and engine counters.
fn diff_into<W: Write>(
    org: &mut dyn ByteSource,
    new: &mut dyn ByteSource,
    out: W,
    t: &Tuning,
) -> Result<(SinkCounters, DiffStats), ToolError> {
    let mut differ = Differ::new(&DiffOptions::from(t)).map_err(|_| ToolError::Memory)?;
    let mut sink = BinaryPatchWriter::new(out);
    differ.diff(org, new, &mut sink)?;
    let counters = *sink.counters();
    sink.into_inner().map_err(ToolError::Write)?;
    Ok((counters, differ.stats()))
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Statistics of a completed apply run.
#[derive(Debug, Clone)]
pub struct ApplyFileStats {
    pub apply: ApplyStats,
    /// SHA-256 of the reconstructed output (with the `file-io` feature).
    pub output_sha256: Option<[u8; 32]>,
}

/// Apply `patch` to `source`, writing the destination to `output`
/// (standard output when `None`).
pub fn patch_files(
    source: &Path,
    patch: &Path,
    output: Option<&Path>,
    tuning: &Tuning,
) -> Result<ApplyFileStats, ToolError> {
    let mut t = tuning.clone();
    t.finish();

    if source.as_os_str() == STDIO_PATH && patch.as_os_str() == STDIO_PATH {
        return Err(ToolError::Args(
            "source and patch cannot both be standard input".into(),
        ));
    }

    let mut org = open_input(source, t.buf_org, t.block_size, t.seq_org, InputRole::Source)?;
    let mut pch = open_input(patch, t.buf_new, t.block_size, t.seq_new, InputRole::Dest)?;
    let mut out = open_output(output)?;

    #[cfg(feature = "file-io")]
    let (apply, output_sha256) = {
        let mut hasher = sha2::Sha256::new();
        let apply = {
            let mut hashing = HashingWriter {
                inner: &mut out,
                hasher: &mut hasher,
            };
            patcher::apply(org.as_mut(), pch.as_mut(), &mut hashing)?
        };
        (apply, Some(hasher.finalize().into()))
    };

    #[cfg(not(feature = "file-io"))]
    let (apply, output_sha256) = (
        patcher::apply(org.as_mut(), pch.as_mut(), &mut out)?,
        None,
    );

    out.flush().map_err(ToolError::Write)?;
    Ok(ApplyFileStats {
        apply,
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// Self-test
// ---------------------------------------------------------------------------

/// Result of a diff-then-apply verification.
#[derive(Debug, Clone)]
pub struct SelfTestReport {
    pub stats: DiffFileStats,
    pub patch_bytes: usize,
    pub verified: bool,
}

/// Diff the two files into memory, apply the patch back onto the source
/// and verify the reconstruction is byte-identical to the destination.
pub fn self_test(source: &Path, dest: &Path, tuning: &Tuning) -> Result<SelfTestReport, ToolError> {
    let mut t = tuning.clone();
    t.finish();

    if source.as_os_str() == STDIO_PATH || dest.as_os_str() == STDIO_PATH {
        return Err(ToolError::Args("self-test needs real file paths".into()));
    }

    // Diff into memory.
    let mut org = open_input(source, t.buf_org, t.block_size, false, InputRole::Source)?;
    let mut new = open_input(dest, t.buf_new, t.block_size, false, InputRole::Dest)?;
    let mut differ = Differ::new(&DiffOptions::from(&t)).map_err(|_| ToolError::Memory)?;
    let mut sink = BinaryPatchWriter::new(Vec::new());
    differ.diff(org.as_mut(), new.as_mut(), &mut sink)?;
    let counters = *sink.counters();
    let engine = differ.stats();
    let patch = sink.into_inner().map_err(ToolError::Write)?;

    // Apply it back and compare.
    let mut org2 = open_input(source, t.buf_org, t.block_size, false, InputRole::Source)?;
    let mut pch = AheadFile::new(io::Cursor::new(patch.clone()), t.buf_new, t.block_size, false)
        .map_err(|_| ToolError::Memory)?;
    let mut rebuilt = Vec::new();
    patcher::apply(org2.as_mut(), &mut pch, &mut rebuilt)?;

    let expected = std::fs::read(dest).map_err(ToolError::OpenDest)?;
    let verified = rebuilt == expected;

    Ok(SelfTestReport {
        stats: DiffFileStats {
            sink: counters,
            engine,
            patch_bytes: patch.len() as i64,
            differences: counters.data > 0,
            seeks_org: org.seek_count(),
            seeks_new: new.seek_count(),
            patch_sha256: None,
        },
        patch_bytes: patch.len(),
        verified,
    })
}

// ---------------------------------------------------------------------------
// Hashing writer (used with the file-io feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "file-io")]
struct HashingWriter<'a, W: Write> {
    inner: W,
    hasher: &'a mut sha2::Sha256,
}

#[cfg(feature = "file-io")]
impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_file(name: &str, data: &[u8]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("jdelta_io_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    fn cleanup(paths: &[&Path]) {
        for p in paths {
            let _ = std::fs::remove_file(p);
        }
    }

    #[test]
    fn diff_patch_file_roundtrip() {
        let source_data = b"The quick brown fox jumps over the lazy dog. 1234567890";
        let dest_data = b"The quick brown cat sits on the lazy mat. 1234567890!!!";

        let source = write_temp_file("source.bin", source_data);
        let dest = write_temp_file("dest.bin", dest_data);
        let patch = write_temp_file("patch.jdf", b"");
        let output = write_temp_file("output.bin", b"");

        let t = Tuning::default();
        let stats = diff_files(&source, &dest, Some(&patch), &t).unwrap();
        assert!(stats.differences);
        assert!(stats.patch_bytes > 0);
        assert_eq!(
            stats.patch_bytes as u64,
            std::fs::metadata(&patch).unwrap().len()
        );

        let apply = patch_files(&source, &patch, Some(&output), &t).unwrap();
        assert_eq!(apply.apply.output, dest_data.len() as u64);
        assert_eq!(std::fs::read(&output).unwrap(), dest_data);

        cleanup(&[&source, &dest, &patch, &output]);
    }

    #[test]
    fn equal_files_report_no_differences() {
        let data: Vec<u8> = (0..10_000).map(|i| (i % 251) as u8).collect();
        let source = write_temp_file("eq_source.bin", &data);
        let dest = write_temp_file("eq_dest.bin", &data);
        let patch = write_temp_file("eq_patch.jdf", b"");

        let stats = diff_files(&source, &dest, Some(&patch), &Tuning::default()).unwrap();
        assert!(!stats.differences);
        assert_eq!(stats.sink.equal, data.len() as i64);

        cleanup(&[&source, &dest, &patch]);
    }

    #[test]
    fn self_test_verifies() {
        let source_data: Vec<u8> = (0..50_000).map(|i| (i * 31 % 251) as u8).collect();
        let mut dest_data = source_data.clone();
        dest_data[25_000] = 0;
        dest_data.extend_from_slice(b"tail");

        let source = write_temp_file("st_source.bin", &source_data);
        let dest = write_temp_file("st_dest.bin", &dest_data);

        let report = self_test(&source, &dest, &Tuning::default()).unwrap();
        assert!(report.verified);
        assert!(report.patch_bytes > 0);

        cleanup(&[&source, &dest]);
    }

    #[test]
    fn missing_source_is_open_error() {
        let missing = std::env::temp_dir().join("jdelta_io_test_definitely_missing");
        let dest = write_temp_file("ms_dest.bin", b"x");
        let err = diff_files(&missing, &dest, None, &Tuning::default()).unwrap_err();
        assert_eq!(err.code(), -3);
        cleanup(&[&dest]);
    }

    #[test]
    fn corrupt_patch_is_reported() {
        let source = write_temp_file("cp_source.bin", b"abcdef");
        // EQL with a truncated length.
        let patch = write_temp_file("cp_patch.jdf", &[crate::jdf::ESC, crate::jdf::EQL]);
        let output = write_temp_file("cp_output.bin", b"");

        let err = patch_files(&source, &patch, Some(&output), &Tuning::default()).unwrap_err();
        assert_eq!(err.code(), -20);

        cleanup(&[&source, &patch, &output]);
    }
}
