// Configuration search: benchmark every grid point and rank the results.
//
// Each trial is an independent, side-effect-free function of
// (source, target, config): the codec output lives in a scratch buffer
// that is measured and dropped. Trials may run on the rayon pool; they
// are collected in grid order and ranked only once all of them have
// finished, so the ranking never depends on completion order.
//
// A codec failure on any grid point aborts the whole run.

use log::{debug, info};

use crate::codec::DeltaCodec;
use crate::config::{self, CompressionConfig, DEFAULT_MAX_WINDOW_EXP};
use crate::error::{Error, Operation, Result};
use crate::report::Reporter;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Measured outcome of one grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkResult {
    pub config: CompressionConfig,
    /// Size of the raw codec output in bytes.
    pub patch_size: u64,
    /// `patch_size / target_size * 100`; +inf for an empty target.
    pub ratio_percent: f64,
}

impl BenchmarkResult {
    pub fn measure(config: CompressionConfig, patch_size: u64, target_size: u64) -> Self {
        let ratio_percent = if target_size == 0 {
            f64::INFINITY
        } else {
            patch_size as f64 / target_size as f64 * 100.0
        };
        Self {
            config,
            patch_size,
            ratio_percent,
        }
    }

    /// The patch is strictly smaller than shipping the whole target.
    pub fn is_viable(&self) -> bool {
        self.ratio_percent < 100.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Board RAM ceiling for `window_exp`.
    pub max_window_exp: u8,
    /// Keep every trial (viable or not) in grid order in the outcome.
    pub report_all: bool,
    /// Run trials concurrently (requires the `parallel` feature).
    pub parallel: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_window_exp: DEFAULT_MAX_WINDOW_EXP,
            report_all: false,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Smallest viable result.
    pub best: BenchmarkResult,
    /// All viable results, ascending by ratio, ties in grid order.
    pub ranked: Vec<BenchmarkResult>,
    /// Every trial in grid order (only with `report_all`).
    pub trials: Vec<BenchmarkResult>,
    pub target_size: u64,
}

impl SearchOutcome {
    /// The `k` best viable results.
    pub fn top(&self, k: usize) -> &[BenchmarkResult] {
        &self.ranked[..k.min(self.ranked.len())]
    }
}

// ---------------------------------------------------------------------------
// Trials
// ---------------------------------------------------------------------------

/// Run the codec once for `config` and measure its output.
pub fn run_trial<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    target: &[u8],
    config: CompressionConfig,
) -> Result<BenchmarkResult> {
    let scratch = codec
        .diff(source, target, config)
        .map_err(|source| Error::CodecFailure {
            operation: Operation::Diff,
            config,
            source,
        })?;
    let result = BenchmarkResult::measure(config, scratch.len() as u64, target.len() as u64);
    debug!(
        "trial {config}: {} bytes ({:.2}%)",
        result.patch_size, result.ratio_percent
    );
    Ok(result)
}

fn run_sequential<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    target: &[u8],
    configs: &[CompressionConfig],
) -> Result<Vec<BenchmarkResult>> {
    configs
        .iter()
        .map(|&cfg| run_trial(codec, source, target, cfg))
        .collect()
}

#[cfg(feature = "parallel")]
fn run_trials<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    target: &[u8],
    configs: &[CompressionConfig],
    parallel: bool,
) -> Result<Vec<BenchmarkResult>> {
    use rayon::prelude::*;

    if !parallel {
        return run_sequential(codec, source, target, configs);
    }
    // Indexed collect keeps grid order regardless of completion order.
    configs
        .par_iter()
        .map(|&cfg| run_trial(codec, source, target, cfg))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run_trials<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    target: &[u8],
    configs: &[CompressionConfig],
    _parallel: bool,
) -> Result<Vec<BenchmarkResult>> {
    run_sequential(codec, source, target, configs)
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Benchmark every configuration up to `options.max_window_exp`.
///
/// Returns `Ok(None)` when no configuration yields a patch strictly
/// smaller than `target`.
pub fn search<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    target: &[u8],
    options: &SearchOptions,
    reporter: &mut dyn Reporter,
) -> Result<Option<SearchOutcome>> {
    let configs: Vec<CompressionConfig> = config::grid(options.max_window_exp).collect();
    info!(
        "searching {} configurations (max window_exp {}, {} trials)",
        configs.len(),
        options.max_window_exp,
        if options.parallel { "parallel" } else { "sequential" }
    );
    reporter.search_started(source.len() as u64, target.len() as u64, configs.len());

    let trials = run_trials(codec, source, target, &configs, options.parallel)?;

    let mut ranked = Vec::with_capacity(trials.len());
    for (i, result) in trials.iter().enumerate() {
        if result.is_viable() {
            ranked.push(*result);
        } else {
            debug!(
                "{}: {} bytes is not smaller than the target",
                result.config, result.patch_size
            );
        }
        reporter.trial(result);
        let window_ends = trials
            .get(i + 1)
            .is_none_or(|next| next.config.window_exp != result.config.window_exp);
        if window_ends {
            reporter.window_done(result.config.window_exp);
        }
    }

    // Stable: equal ratios keep grid order.
    ranked.sort_by(|a, b| a.ratio_percent.total_cmp(&b.ratio_percent));

    let outcome = ranked.first().copied().map(|best| SearchOutcome {
        best,
        ranked,
        trials: if options.report_all {
            trials
        } else {
            Vec::new()
        },
        target_size: target.len() as u64,
    });

    match &outcome {
        Some(o) => info!(
            "best {}: {} bytes ({:.2}%)",
            o.best.config, o.best.patch_size, o.best.ratio_percent
        ),
        None => info!("no viable configuration"),
    }
    reporter.search_finished(outcome.as_ref());
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
