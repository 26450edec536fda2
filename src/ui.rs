// UI layer: everything the operator sees. Per-file messages and the running
// progress bar are two separate channels: the bar lives on stderr, messages
// are written to the output stream while the bar is suspended, so neither
// tears the other and messages still appear when stderr is not a terminal.

use crate::api::UploadError;
use crate::batch::BatchSummary;
use crate::ledger::Ledger;
use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::cell::RefCell;
use std::io::{self, Write};
use std::path::Path;

/// Receives progress and outcome events from a batch session.
pub trait Reporter {
    fn no_candidates(&self, folder: &Path, extensions: &[String]);
    fn overview(&self, found: usize, already_uploaded: usize, previously_failed: usize, pending: usize);
    fn start(&self, total: usize);
    fn attempt_failed(&self, path: &Path, attempt: u32, max_retries: u32, error: &UploadError);
    fn succeeded(&self, path: &Path);
    fn marked_failed(&self, path: &Path, failed_log: &Path);
    /// One more file reached a terminal state.
    fn advance(&self);
    fn finish(&self, summary: &BatchSummary, ledger: &Ledger);
}

/// Terminal reporter: lines on stdout plus an indicatif bar on stderr.
pub struct ConsoleReporter {
    bar: ProgressBar,
    show_bar: bool,
    out: RefCell<Box<dyn Write>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()), true)
    }

    /// Write messages to `out`. With `show_bar` false the progress bar is
    /// never drawn.
    pub fn with_output(out: Box<dyn Write>, show_bar: bool) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
        let style = ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {pos}/{len} files ({elapsed_precise}, eta {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        bar.set_message("Uploading files");
        ConsoleReporter {
            bar,
            show_bar,
            out: RefCell::new(out),
        }
    }

    fn emit(&self, line: &str) {
        self.bar.suspend(|| {
            let mut out = self.out.borrow_mut();
            // Best effort.
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        });
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl Reporter for ConsoleReporter {
    fn no_candidates(&self, folder: &Path, extensions: &[String]) {
        self.emit(&format!(
            "No image files in '{}' with extensions {}",
            folder.display(),
            extensions.join(" ")
        ));
    }

    fn overview(&self, found: usize, already_uploaded: usize, previously_failed: usize, pending: usize) {
        self.emit(&format!("Files found            : {}", found));
        self.emit(&format!("Already uploaded (log) : {}", already_uploaded));
        self.emit(&format!("Failed in earlier runs : {}", previously_failed));
        self.emit(&format!("To attempt now         : {}", pending));
    }

    fn start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        if self.show_bar {
            self.bar.set_draw_target(ProgressDrawTarget::stderr());
        }
    }

    fn attempt_failed(&self, path: &Path, attempt: u32, max_retries: u32, error: &UploadError) {
        self.emit(&format!(
            "  {} Attempt {}/{} failed ({}): {}",
            "⚠".yellow(),
            attempt,
            max_retries,
            display_name(path),
            error.category()
        ));
    }

    fn succeeded(&self, path: &Path) {
        self.emit(&format!("  {} Done: {}", "✓".green(), path.display()));
    }

    fn marked_failed(&self, path: &Path, failed_log: &Path) {
        self.emit(&format!(
            "  {} Marked failed: {} (see {})",
            "✗".red(),
            path.display(),
            failed_log.display()
        ));
    }

    fn advance(&self) {
        self.bar.inc(1);
    }

    fn finish(&self, summary: &BatchSummary, ledger: &Ledger) {
        self.bar.finish_and_clear();
        self.emit("");
        self.emit(&format!(
            "Upload finished: {} succeeded, {} failed, {} total",
            summary.succeeded.to_string().green(),
            summary.failed.to_string().red(),
            summary.total
        ));
        self.emit(&format!("- Success log: {}", ledger.uploaded.path().display()));
        self.emit(&format!(
            "- Failure log: {} (run again to retry these files)",
            ledger.failed.path().display()
        ));
    }
}
