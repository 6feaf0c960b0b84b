// Command-line front end for fwpatch.
//
// `search` benchmarks every heatshrink configuration for a pair of
// firmware images, `build` produces and verifies a patch for one
// configuration, `apply` replays a patch the way the device would.
// This module is the only place that turns errors into exit codes.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use log::error;

use crate::codec::{BsdiffHeatshrink, BsdiffPrefix};
use crate::config::{
    self, CompressionConfig, DEFAULT_MAX_WINDOW_EXP, MIN_LOOKAHEAD_EXP, MIN_WINDOW_EXP,
    TOP_RESULTS,
};
use crate::error::{Error, Operation, Result};
use crate::header::{CODEC_PREFIX_LEN, HEADER_LEN, PatchArtifact};
use crate::image::hex;
use crate::io::{apply_file, build_and_verify_files, search_files};
use crate::report::{NullReporter, TableReporter};
use crate::search::{BenchmarkResult, SearchOptions, SearchOutcome};

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Firmware delta patch generator (bsdiff + heatshrink).
#[derive(Parser, Debug)]
#[command(
    name = "fwpatch",
    version,
    about = "Build size-optimal bsdiff/heatshrink firmware patches",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Quiet mode (only errors are logged).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Append log records to this file instead of stderr.
    #[arg(long = "log-file", global = true, value_hint = ValueHint::FilePath)]
    log_file: Option<PathBuf>,

    /// Print results as JSON on stdout.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Benchmark every compression configuration and print the best one.
    Search(SearchArgs),
    /// Build a patch for one configuration and verify it.
    Build(BuildArgs),
    /// Reconstruct a target image from a source image and a patch.
    Apply(ApplyArgs),
    /// Print the header of a patch file.
    Info(InfoArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// The source firmware image.
    #[arg(value_hint = ValueHint::FilePath)]
    source: PathBuf,

    /// The target firmware image.
    #[arg(value_hint = ValueHint::FilePath)]
    target: PathBuf,

    /// Print the full benchmark table (ignored with --json).
    #[arg(short = 'd', long)]
    debug: bool,

    /// Largest window exponent to consider (board RAM ceiling).
    #[arg(
        long = "max-window-exp",
        alias = "max-window-sz2",
        default_value_t = DEFAULT_MAX_WINDOW_EXP
    )]
    max_window_exp: u8,

    /// Run the trials one after another.
    #[arg(long)]
    sequential: bool,
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// The source firmware image.
    #[arg(value_hint = ValueHint::FilePath)]
    source: PathBuf,

    /// The target firmware image.
    #[arg(value_hint = ValueHint::FilePath)]
    target: PathBuf,

    /// Output patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Reconstructed image written during verification.
    #[arg(value_hint = ValueHint::FilePath)]
    new_file: PathBuf,

    /// Window exponent (window_sz2).
    window_exp: u8,

    /// Lookahead exponent (lookahead_sz2).
    lookahead_exp: u8,

    /// Maximum patch size (supports K/M/G suffix).
    #[arg(value_parser = parse_byte_size)]
    max_size: u64,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// The source firmware image.
    #[arg(value_hint = ValueHint::FilePath)]
    source: PathBuf,

    /// Patch file produced by `build`.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Reconstructed image.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv = std::iter::once("fwpatch".to_string()).chain(args.iter().cloned());
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = default_filter(&cli);
        if let Cmd::Build(args) = &cli.command {
            let _ = CompressionConfig::new(args.window_exp, args.lookahead_exp).validate();
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn default_filter(cli: &Cli) -> &'static str {
    if cli.quiet {
        return "error";
    }
    match (cli.verbose, cli.log_file.is_some()) {
        (0, false) => "warn",
        (0, true) | (1, _) => "info",
        _ => "debug",
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let env = env_logger::Env::default().default_filter_or(default_filter(cli));
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_target(false);

    match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::io(path, e))?;
            builder
                .format_timestamp_secs()
                .target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.format_timestamp(None);
        }
    }
    // A logger installed by an embedding program wins.
    let _ = builder.try_init();
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

fn result_json(result: &BenchmarkResult) -> serde_json::Value {
    serde_json::json!({
        "window_exp": result.config.window_exp,
        "lookahead_exp": result.config.lookahead_exp,
        "patch_size": result.patch_size,
        "ratio_percent": result.ratio_percent,
    })
}

fn digest_json(digest: Option<[u8; 32]>) -> serde_json::Value {
    digest.map_or(serde_json::Value::Null, |d| hex(&d).into())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_search(args: &SearchArgs, json_output: bool) -> Result<()> {
    let table = args.debug && !json_output;
    let options = SearchOptions {
        max_window_exp: args.max_window_exp,
        report_all: table,
        parallel: !args.sequential,
    };

    let outcome = if table {
        let stdout = io::stdout().lock();
        let mut reporter = TableReporter::new(
            stdout,
            args.source.display().to_string(),
            args.target.display().to_string(),
        );
        let outcome = search_files(
            &BsdiffHeatshrink,
            &args.source,
            &args.target,
            &options,
            &mut reporter,
        )?;
        reporter.finish().map_err(|e| Error::io("<stdout>", e))?;
        outcome
    } else {
        search_files(&BsdiffHeatshrink, &args.source, &args.target, &options, &mut NullReporter)?
    };

    let Some(outcome) = outcome else {
        let target_size = std::fs::metadata(&args.target)
            .map_err(|e| Error::io(&args.target, e))?
            .len();
        return Err(Error::NoViableConfiguration {
            max_window_exp: args.max_window_exp,
            target_size,
        });
    };

    if json_output {
        println!("{:#}", search_json(&outcome));
    } else if !table {
        println!(
            "{} {}",
            outcome.best.config.window_exp, outcome.best.config.lookahead_exp
        );
    }
    Ok(())
}

fn search_json(outcome: &SearchOutcome) -> serde_json::Value {
    serde_json::json!({
        "command": "search",
        "target_size": outcome.target_size,
        "best": result_json(&outcome.best),
        "top": outcome.top(TOP_RESULTS).iter().map(result_json).collect::<Vec<_>>(),
        "viable": outcome.ranked.len(),
    })
}

fn cmd_build(args: &BuildArgs, json_output: bool) -> Result<()> {
    let config = CompressionConfig::new(args.window_exp, args.lookahead_exp);
    let stats = build_and_verify_files(
        &BsdiffHeatshrink,
        &args.source,
        &args.target,
        &args.patch,
        &args.new_file,
        config,
        args.max_size,
    )?;

    if json_output {
        let json = serde_json::json!({
            "command": "build",
            "patch": args.patch.display().to_string(),
            "window_exp": stats.config.window_exp,
            "lookahead_exp": stats.config.lookahead_exp,
            "source_size": stats.source_size,
            "target_size": stats.target_size,
            "patch_size": stats.patch_size,
            "ratio_percent": stats.ratio_percent,
            "target_sha256": digest_json(stats.target_sha256),
            "output_sha256": digest_json(stats.output_sha256),
        });
        println!("{json:#}");
    }
    Ok(())
}

fn cmd_apply(args: &ApplyArgs, json_output: bool) -> Result<()> {
    let stats = apply_file(&BsdiffHeatshrink, &args.source, &args.patch, &args.output)?;
    if json_output {
        let json = serde_json::json!({
            "command": "apply",
            "window_exp": stats.config.window_exp,
            "lookahead_exp": stats.config.lookahead_exp,
            "source_size": stats.source_size,
            "patch_size": stats.patch_size,
            "output_size": stats.output_size,
            "output_sha256": digest_json(stats.output_sha256),
        });
        println!("{json:#}");
    }
    Ok(())
}

fn read_artifact(path: &Path) -> Result<PatchArtifact> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    PatchArtifact::from_bytes(bytes)
}

fn cmd_info(args: &InfoArgs, json_output: bool) -> Result<()> {
    let artifact = read_artifact(&args.patch)?;
    let config = artifact.config();
    let prefix = BsdiffPrefix::parse(artifact.prefix()).map_err(|source| Error::CodecFailure {
        operation: Operation::Apply,
        config,
        source,
    })?;
    let stream_len = artifact.diff_stream().len();

    if json_output {
        let json = serde_json::json!({
            "command": "info",
            "patch_size": artifact.len(),
            "target_size": prefix.target_size,
            "window_exp": config.window_exp,
            "lookahead_exp": config.lookahead_exp,
            "stream_size": stream_len,
            "valid_config": config.validate().is_ok(),
        });
        println!("{json:#}");
        return Ok(());
    }

    println!("patch:         {}", args.patch.display());
    println!("patch size:    {} bytes", artifact.len());
    println!("magic:         {}", String::from_utf8_lossy(&artifact.prefix()[..8]));
    println!("target size:   {} bytes", prefix.target_size);
    println!("window_exp:    {}", config.window_exp);
    println!("lookahead_exp: {}", config.lookahead_exp);
    println!("stream size:   {stream_len} bytes");
    match config.validate() {
        Ok(()) => println!(
            "decoder RAM:   {} byte window, {} byte lookahead",
            config.window_size(),
            config.lookahead_size()
        ),
        Err(e) => println!("warning:       {e}"),
    }
    Ok(())
}

fn cmd_config() {
    let version = env!("CARGO_PKG_VERSION");
    println!("fwpatch version {version}");

    let parallel = cfg!(feature = "parallel") as u8;
    let file_io = cfg!(feature = "file-io") as u8;
    println!("PARALLEL={parallel}");
    println!("FILE_IO={file_io}");
    #[cfg(feature = "parallel")]
    println!("THREADS={}", rayon::current_num_threads());
    println!("MIN_WINDOW_EXP={MIN_WINDOW_EXP}");
    println!("MIN_LOOKAHEAD_EXP={MIN_LOOKAHEAD_EXP}");
    println!("DEFAULT_MAX_WINDOW_EXP={DEFAULT_MAX_WINDOW_EXP}");
    println!("GRID_SIZE={}", config::grid_len(DEFAULT_MAX_WINDOW_EXP));
    println!("TOP_RESULTS={TOP_RESULTS}");
    println!("CODEC_PREFIX_LEN={CODEC_PREFIX_LEN}");
    println!("HEADER_LEN={HEADER_LEN}");
}

fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Cmd::Search(args) => cmd_search(args, cli.json_output),
        Cmd::Build(args) => cmd_build(args, cli.json_output),
        Cmd::Apply(args) => cmd_apply(args, cli.json_output),
        Cmd::Info(args) => cmd_info(args, cli.json_output),
        Cmd::Config => {
            cmd_config();
            Ok(())
        }
    }
}

/// CLI entry point.
pub fn run() -> ! {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("fwpatch: {e}");
        process::exit(e.exit_code());
    }

    let exit_code = match execute(&cli) {
        Ok(()) => 0,
        Err(e) => {
            if cli.log_file.is_some() {
                error!("{e}");
            }
            eprintln!("fwpatch: {e}");
            e.exit_code()
        }
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
