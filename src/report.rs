// Search progress reporting.
//
// The search engine never prints. It drives a `Reporter`, and the CLI
// decides whether that is the benchmark table or nothing at all.

use std::io::{self, Write};

use crate::config::TOP_RESULTS;
use crate::search::{BenchmarkResult, SearchOutcome};

/// Receives search events in grid order.
pub trait Reporter {
    fn search_started(&mut self, _source_size: u64, _target_size: u64, _trials: usize) {}

    fn trial(&mut self, _result: &BenchmarkResult) {}

    /// All lookahead exponents for `window_exp` have been reported.
    fn window_done(&mut self, _window_exp: u8) {}

    /// `None` when no configuration was viable.
    fn search_finished(&mut self, _outcome: Option<&SearchOutcome>) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {}

// ---------------------------------------------------------------------------
// TableReporter
// ---------------------------------------------------------------------------

const COL: usize = 15;

fn header_row() -> String {
    format!(
        "| {:<COL$} | {:<COL$} | {:<COL$} | {:<COL$}|",
        "window_sz2", "lookahead_sz2", "Patch Size", "Patch/FW_Target %"
    )
}

/// Renders the benchmark table to `out`.
///
/// Write errors are remembered and returned by [`TableReporter::finish`];
/// after the first one nothing more is written.
pub struct TableReporter<W: Write> {
    out: W,
    source_label: String,
    target_label: String,
    header: String,
    error: Option<io::Error>,
}

impl<W: Write> TableReporter<W> {
    pub fn new(out: W, source_label: impl Into<String>, target_label: impl Into<String>) -> Self {
        Self {
            out,
            source_label: source_label.into(),
            target_label: target_label.into(),
            header: header_row(),
            error: None,
        }
    }

    /// Flush and hand back the writer, or the first write error.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn emit(&mut self, line: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.out, "{line}") {
            self.error = Some(e);
        }
    }

    fn separator(&self) -> String {
        format!("|{}|", "-".repeat(self.header.len() - 2))
    }

    fn summary_line(result: &BenchmarkResult) -> String {
        format!(
            "window_sz2: {}, lookahead_sz2: {} = Patch size: {} bytes and Patch/FW_Target size percentage: {:.2}%",
            result.config.window_exp,
            result.config.lookahead_exp,
            result.patch_size,
            result.ratio_percent
        )
    }
}

impl<W: Write> Reporter for TableReporter<W> {
    fn search_started(&mut self, source_size: u64, target_size: u64, _trials: usize) {
        let stars = "*".repeat(self.header.len());
        let dashes = "-".repeat(self.header.len());
        let source = format!(
            "**   - source_FW = {} ({:<8} bytes) **",
            self.source_label, source_size
        );
        let target = format!(
            "**   - target_FW = {} ({:<8} bytes) **",
            self.target_label, target_size
        );
        let header = self.header.clone();
        let separator = self.separator();

        self.emit(&stars);
        self.emit("** Test all the heatshrink configurations to create a patch between :   **");
        self.emit(&source);
        self.emit(&target);
        self.emit(&stars);
        self.emit(&dashes);
        self.emit(&header);
        self.emit(&separator);
    }

    fn trial(&mut self, result: &BenchmarkResult) {
        let w = result.config.window_exp;
        let l = result.config.lookahead_exp;
        let size = result.patch_size;
        let row = if result.is_viable() {
            format!(
                "| {w:<COL$} | {l:<COL$} | {size:<COL$} | {:>6.2}%{:<8}|",
                result.ratio_percent, ""
            )
        } else {
            format!(
                "| {w:<COL$} | {l:<COL$} | {size:<COL$} | {:<COL$}  |",
                "Patch too big"
            )
        };
        self.emit(&row);
    }

    fn window_done(&mut self, _window_exp: u8) {
        let separator = self.separator();
        self.emit(&separator);
    }

    fn search_finished(&mut self, outcome: Option<&SearchOutcome>) {
        let Some(outcome) = outcome else {
            self.emit("No valid heatshrink configuration produced a smaller patch than FW_target.");
            return;
        };
        self.emit("");
        self.emit(&format!(
            "These are the {TOP_RESULTS} best configurations : "
        ));
        for result in outcome.top(TOP_RESULTS) {
            let line = format!("   - {}", Self::summary_line(result));
            self.emit(&line);
        }
        let best = format!("Best result -> {}", Self::summary_line(&outcome.best));
        self.emit(&best);
    }
}
