//! Fakes shared by the integration tests.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dataset_uploader::api::{UploadError, Uploader};
use dataset_uploader::batch::{BatchSummary, Sleeper};
use dataset_uploader::ledger::Ledger;
use dataset_uploader::ui::Reporter;

/// Fails each file a configured number of times before succeeding.
/// Files without an entry succeed on the first attempt.
#[derive(Default)]
pub struct FlakyUploader {
    failures: HashMap<PathBuf, u32>,
    permanent: bool,
    calls: RefCell<Vec<PathBuf>>,
}

impl FlakyUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, path: impl Into<PathBuf>, times: u32) -> Self {
        self.failures.insert(path.into(), times);
        self
    }

    /// Report failures as explicit rejections instead of network errors.
    pub fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Uploader for FlakyUploader {
    fn upload(&self, path: &Path) -> Result<(), UploadError> {
        let mut calls = self.calls.borrow_mut();
        calls.push(path.to_path_buf());
        let attempt = calls.iter().filter(|p| p.as_path() == path).count() as u32;
        match self.failures.get(path) {
            Some(&times) if attempt <= times => {
                if self.permanent {
                    Err(UploadError::Rejected("invalid image".into()))
                } else {
                    Err(UploadError::Network("connection reset".into()))
                }
            }
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.borrow_mut().push(duration);
    }
}

/// Records every reporter event as a short line.
#[derive(Default)]
pub struct RecordingReporter {
    pub events: RefCell<Vec<String>>,
    pub advanced: Cell<usize>,
}

impl RecordingReporter {
    fn push(&self, event: String) {
        self.events.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl Reporter for RecordingReporter {
    fn no_candidates(&self, _folder: &Path, _extensions: &[String]) {
        self.push("no-candidates".into());
    }

    fn overview(&self, found: usize, already_uploaded: usize, previously_failed: usize, pending: usize) {
        self.push(format!(
            "overview {} {} {} {}",
            found, already_uploaded, previously_failed, pending
        ));
    }

    fn start(&self, total: usize) {
        self.push(format!("start {}", total));
    }

    fn attempt_failed(&self, path: &Path, attempt: u32, max_retries: u32, error: &UploadError) {
        self.push(format!(
            "attempt-failed {} {}/{} {}",
            path.file_name().unwrap().to_string_lossy(),
            attempt,
            max_retries,
            error.category()
        ));
    }

    fn succeeded(&self, path: &Path) {
        self.push(format!("succeeded {}", path.file_name().unwrap().to_string_lossy()));
    }

    fn marked_failed(&self, path: &Path, _failed_log: &Path) {
        self.push(format!("failed {}", path.file_name().unwrap().to_string_lossy()));
    }

    fn advance(&self) {
        self.advanced.set(self.advanced.get() + 1);
    }

    fn finish(&self, summary: &BatchSummary, _ledger: &Ledger) {
        self.push(format!("finish {}/{}", summary.succeeded, summary.total));
    }
}

pub fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}
