// Batch module: the resumable upload loop. Candidates are collected from one
// folder, anything already in the success log is dropped, and the rest is
// uploaded one file at a time with exponential backoff between attempts.

use crate::api::Uploader;
use crate::config::{BatchConfig, RetryPolicy};
use crate::ledger::Ledger;
use crate::ui::Reporter;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Blocks the batch between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Production sleeper: parks the whole process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Terminal state of one file within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded { attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_paths: Vec<PathBuf>,
}

/// String form of a path as written to and matched against the logs.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// List the files directly inside `dir` whose names end with one of
/// `extensions` (case-sensitive), sorted by path. Dot-files are skipped and a
/// missing folder yields no candidates.
pub fn collect_candidates(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(folder = %dir.display(), "image folder does not exist");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list folder {}", dir.display()))
        }
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list folder {}", dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            warn!(name = ?entry.file_name(), "skipping file with a non UTF-8 name");
            continue;
        };
        if name.starts_with('.') || !extensions.iter().any(|ext| name.ends_with(ext.as_str())) {
            continue;
        }
        let path = dir.join(name);
        if path.is_file() {
            candidates.push(path);
        }
    }

    candidates.sort_by_cached_key(|p| path_key(p));
    Ok(candidates)
}

/// Candidates not yet recorded as uploaded, in their original order.
pub fn filter_pending(candidates: &[PathBuf], uploaded: &HashSet<String>) -> Vec<PathBuf> {
    candidates
        .iter()
        .filter(|p| !uploaded.contains(&path_key(p)))
        .cloned()
        .collect()
}

/// Drives uploads for one batch. Holds borrowed collaborators only; the
/// caller owns the uploader, logs and output channels.
pub struct BatchRunner<'a> {
    uploader: &'a dyn Uploader,
    ledger: &'a Ledger,
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
    reporter: &'a dyn Reporter,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        uploader: &'a dyn Uploader,
        ledger: &'a Ledger,
        policy: RetryPolicy,
        sleeper: &'a dyn Sleeper,
        reporter: &'a dyn Reporter,
    ) -> Self {
        BatchRunner {
            uploader,
            ledger,
            policy,
            sleeper,
            reporter,
        }
    }

    /// Upload one file, retrying up to `max_retries` attempts in total.
    /// Exactly one log line is appended per call: to the success log when an
    /// attempt succeeds, to the failure log once attempts run out.
    pub fn upload_with_retry(&self, path: &Path) -> Result<Outcome> {
        let max_retries = self.policy.max_retries.max(1);
        let key = path_key(path);

        let mut attempt = 1;
        loop {
            debug!(path = %key, attempt, "uploading");
            let err = match self.uploader.upload(path) {
                Ok(()) => {
                    self.ledger.uploaded.append(&key)?;
                    self.reporter.succeeded(path);
                    return Ok(Outcome::Succeeded { attempts: attempt });
                }
                Err(err) => err,
            };

            self.reporter.attempt_failed(path, attempt, max_retries, &err);
            let permanent = err.is_permanent();
            if attempt >= max_retries || (permanent && !self.policy.retry_permanent) {
                warn!(path = %key, attempt, permanent, error = %err, "giving up on file");
                self.ledger.failed.append(&key)?;
                self.reporter.marked_failed(path, self.ledger.failed.path());
                return Ok(Outcome::Failed {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            let delay = self.policy.delay_after(attempt);
            debug!(path = %key, attempt, ?delay, error = %err, "backing off");
            self.sleeper.sleep(delay);
            attempt += 1;
        }
    }

    /// Resolve every pending file in order, one at a time.
    pub fn run(&self, pending: &[PathBuf]) -> Result<BatchSummary> {
        self.reporter.start(pending.len());

        let mut summary = BatchSummary {
            total: pending.len(),
            ..BatchSummary::default()
        };
        for path in pending {
            let outcome = self.upload_with_retry(path)?;
            if outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
                summary.failed_paths.push(path.clone());
            }
            self.reporter.advance();
        }

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }
}

/// One full run: collect, resume from the logs, upload, summarise. Returns
/// `None` without touching the logs when the folder holds no candidates.
pub fn run_session(
    config: &BatchConfig,
    uploader: &dyn Uploader,
    sleeper: &dyn Sleeper,
    reporter: &dyn Reporter,
) -> Result<Option<BatchSummary>> {
    let candidates = collect_candidates(&config.folder, &config.extensions)?;
    if candidates.is_empty() {
        reporter.no_candidates(&config.folder, &config.extensions);
        return Ok(None);
    }

    let ledger = Ledger::new(&config.uploaded_log, &config.failed_log);
    let uploaded = ledger.uploaded.load()?;
    let previously_failed = ledger.failed.load()?;
    let pending = filter_pending(&candidates, &uploaded);
    reporter.overview(candidates.len(), uploaded.len(), previously_failed.len(), pending.len());

    let summary = BatchRunner::new(uploader, &ledger, config.retry, sleeper, reporter).run(&pending)?;
    reporter.finish(&summary, &ledger);
    Ok(Some(summary))
}
