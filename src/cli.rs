// Command line front end.
//
// Flag set and defaults follow the classic jdiff surface: positional
// source/destination/output with `-` for stdio, -j/-u/-t mode selection,
// stackable -v/-b/-f, and the size knobs -i/-k/-m/-a/-n/-x. All reporting
// goes to stderr; the patch (or reconstructed file) goes to the output.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};

use crate::config::Tuning;
use crate::engine::{DiffOptions, Differ};
use crate::io::{self, DiffFileStats, InputRole, ToolError, STDIO_PATH};
use crate::jdf::listing::{ListingSink, RegionsSink};
use crate::jdf::writer::PatchSink;

/// Binary diff producing compact JDF patches.
#[derive(Parser, Debug)]
#[command(
    name = "jdelta",
    version,
    about = "Binary diff/undiff with compact JDF patches",
    arg_required_else_help = true
)]
struct Cli {
    /// Source file (`-` for standard input).
    source: PathBuf,

    /// Destination file to diff against (with -u: the patch file).
    second: PathBuf,

    /// Output file (default: standard output).
    output: Option<PathBuf>,

    /// Create a patch (the default).
    #[arg(short = 'j', long = "jdiff")]
    jdiff: bool,

    /// Apply a patch instead of creating one.
    #[arg(short = 'u', long = "undiff", conflicts_with = "jdiff")]
    undiff: bool,

    /// Diff, re-apply and verify in one go.
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Verbose: results and statistics (stackable).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Per-byte human-readable listing instead of a patch.
    #[arg(short = 'l', long = "listing", conflicts_with = "regions")]
    listing: bool,

    /// Grouped human-readable regions instead of a patch.
    #[arg(short = 'r', long = "regions")]
    regions: bool,

    /// Better: more memory, more searching (stackable).
    #[arg(short = 'b', long = "better", action = ArgAction::Count)]
    better: u8,

    /// Lazy: buffered compares only; twice drops the full index (stackable).
    #[arg(short = 'f', long = "lazy", action = ArgAction::Count)]
    lazy: u8,

    /// Sequential source (to avoid!): no prescan, no backtracking.
    #[arg(short = 'p', long = "sequential-source")]
    seq_source: bool,

    /// Sequential destination.
    #[arg(short = 'q', long = "sequential-dest")]
    seq_dest: bool,

    /// Use the plain synchronous stdio reader (always the case here;
    /// accepted for compatibility).
    #[arg(short = 's', long = "stdio")]
    stdio: bool,

    /// Index table size in MiB.
    #[arg(short = 'i', long = "index-size", value_name = "MB")]
    index_size: Option<usize>,

    /// Read block size in bytes.
    #[arg(short = 'k', long = "block-size", value_name = "BYTES")]
    block_size: Option<i64>,

    /// Total buffer size in KiB, split between the two inputs.
    #[arg(short = 'm', long = "buffer-size", value_name = "KB")]
    buffer_size: Option<i64>,

    /// Search window in KiB.
    #[arg(short = 'a', long = "search-size", value_name = "KB")]
    search_size: Option<i64>,

    /// Minimum number of matches to search.
    #[arg(short = 'n', long = "search-min", value_name = "COUNT")]
    search_min: Option<usize>,

    /// Maximum number of matches to search.
    #[arg(short = 'x', long = "search-max", value_name = "COUNT")]
    search_max: Option<usize>,
}

/// Parse arguments, run, exit.
pub fn run() -> ! {
    let cli = Cli::parse();
    match execute(&cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("jdelta: {e}");
            process::exit(-e.code());
        }
    }
}

fn execute(cli: &Cli) -> Result<i32, ToolError> {
    let tuning = build_tuning(cli);

    match (cli.jdiff, cli.undiff, cli.test) {
        (_, true, _) => run_undiff(cli, &tuning),
        (_, _, true) => run_selftest(cli, &tuning),
        _ => run_diff(cli, &tuning),
    }
}

/// Fold the option ladders and explicit sizes into one Tuning.
fn build_tuning(cli: &Cli) -> Tuning {
    let mut t = Tuning::default();

    for _ in 0..cli.better {
        t.better();
    }
    for _ in 0..cli.lazy {
        t.lazy();
    }
    if cli.seq_source || cli.source.as_os_str() == STDIO_PATH {
        if !cli.seq_source && cli.verbose > 0 {
            eprintln!("jdelta: source is standard input, assuming --sequential-source");
        }
        t.sequential_source();
    }
    if cli.seq_dest || cli.second.as_os_str() == STDIO_PATH {
        t.sequential_dest();
    }

    if let Some(mb) = cli.index_size {
        t.index_size = mb.max(1) * 1024 * 1024;
    }
    if let Some(bytes) = cli.block_size {
        t.block_size = bytes.max(1);
    }
    if let Some(kb) = cli.buffer_size {
        let total = kb.max(1) * 1024;
        t.buf_org = total / 2;
        t.buf_new = total / 2;
    }
    if let Some(kb) = cli.search_size {
        t.ahead = kb.max(1) * 1024;
    }
    if let Some(n) = cli.search_min {
        t.match_min = n;
    }
    if let Some(x) = cli.search_max {
        t.match_max = x.max(1);
    }

    t.finish();

    if cli.stdio && cli.verbose > 1 {
        eprintln!("jdelta: synchronous stdio reader is the only reader in this build");
    }
    if cli.verbose > 1 {
        eprintln!("index size   (-i): {} MiB", t.index_size / (1024 * 1024));
        eprintln!("buffer size  (-m): {} KiB", (t.buf_org + t.buf_new) / 1024);
        eprintln!("block size   (-k): {} bytes", t.block_size);
        eprintln!("search size  (-a): {} KiB", t.ahead / 1024);
        eprintln!("matches      (-n/-x): {}..{}", t.match_min, t.match_max);
        eprintln!("prescan          : {}", t.prescan);
        eprintln!("backtracking     : {}", t.backtrack);
        eprintln!("compare all      : {}", t.compare_all);
    }

    t
}

fn run_diff(cli: &Cli, tuning: &Tuning) -> Result<i32, ToolError> {
    let stats = if cli.listing || cli.regions {
        diff_to_human_sink(cli, tuning)?
    } else {
        io::diff_files(&cli.source, &cli.second, cli.output.as_deref(), tuning)?
    };

    report_diff(&stats, cli.verbose);
    Ok(if stats.differences { 1 } else { 0 })
}

/// Diff into a listing/regions sink instead of the binary writer.
fn diff_to_human_sink(cli: &Cli, tuning: &Tuning) -> Result<DiffFileStats, ToolError> {
    let mut t = tuning.clone();
    t.finish();

    let mut org = io::open_input(
        &cli.source,
        t.buf_org,
        t.block_size,
        t.seq_org,
        InputRole::Source,
    )?;
    let mut new = io::open_input(
        &cli.second,
        t.buf_new,
        t.block_size,
        t.seq_new,
        InputRole::Dest,
    )?;
    let out = io::open_output(cli.output.as_deref())?;

    let mut differ = Differ::new(&DiffOptions::from(&t)).map_err(|_| ToolError::Memory)?;

    let counters = if cli.listing {
        let mut sink = ListingSink::new(out);
        differ.diff(org.as_mut(), new.as_mut(), &mut sink)?;
        *sink.counters()
    } else {
        let mut sink = RegionsSink::new(out);
        differ.diff(org.as_mut(), new.as_mut(), &mut sink)?;
        *sink.counters()
    };

    Ok(DiffFileStats {
        sink: counters,
        engine: differ.stats(),
        patch_bytes: 0,
        differences: counters.data > 0,
        seeks_org: org.seek_count(),
        seeks_new: new.seek_count(),
        patch_sha256: None,
    })
}

fn run_undiff(cli: &Cli, tuning: &Tuning) -> Result<i32, ToolError> {
    let stats = io::patch_files(&cli.source, &cli.second, cli.output.as_deref(), tuning)?;

    if cli.verbose > 0 {
        let a = &stats.apply;
        eprintln!("output      bytes   = {}", a.output);
        eprintln!("equal       bytes   = {}", a.equal);
        eprintln!("modified    bytes   = {}", a.modified);
        eprintln!("inserted    bytes   = {}", a.inserted);
        eprintln!("deleted     bytes   = {}", a.deleted);
        eprintln!("backtracked bytes   = {}", a.backtracked);
    }
    if stats.apply.trailing > 0 {
        eprintln!("jdelta: warning: trailing bytes at end of patch, file may be corrupted");
    }
    Ok(0)
}

fn run_selftest(cli: &Cli, tuning: &Tuning) -> Result<i32, ToolError> {
    let report = io::self_test(&cli.source, &cli.second, tuning)?;
    report_diff(&report.stats, cli.verbose);

    if !report.verified {
        return Err(ToolError::Other(
            "self-test failed: reconstruction differs from destination".into(),
        ));
    }
    if cli.verbose > 0 {
        eprintln!("self-test ok: {} patch bytes", report.patch_bytes);
    }
    Ok(if report.stats.differences { 1 } else { 0 })
}

fn report_diff(stats: &DiffFileStats, verbose: u8) {
    if verbose > 1 {
        eprintln!("index hits          = {}", stats.engine.index_hits);
        eprintln!("index repairs       = {}", stats.engine.index_repairs);
        eprintln!("index overloading   = {}", stats.engine.index_overload);
        eprintln!("reliability range   = {}", stats.engine.reliability);
        eprintln!("inaccurate solutions= {}", stats.engine.inaccurate);
        eprintln!("source seeks        = {}", stats.seeks_org);
        eprintln!("destination seeks   = {}", stats.seeks_new);
        eprintln!("delete      bytes   = {}", stats.sink.delete);
        eprintln!("backtrack   bytes   = {}", stats.sink.backtrack);
        eprintln!("escape      bytes   = {}", stats.sink.escape);
        eprintln!("control     bytes   = {}", stats.sink.control);
    }
    if verbose > 0 {
        eprintln!("equal       bytes   = {}", stats.sink.equal);
        eprintln!("data        bytes   = {}", stats.sink.data);
        eprintln!("patch       bytes   = {}", stats.patch_bytes);
        if !stats.differences {
            eprintln!("no differences found");
        }
    }
}
