// Append-only outcome logs. One path per line, UTF-8, never rewritten.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A plain-text log file holding one path per line.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LogFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every distinct non-blank line, trimmed. A missing file is an
    /// empty log.
    pub fn load(&self) -> Result<HashSet<String>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open log {}", self.path.display()))
            }
        };

        let mut entries = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line.with_context(|| format!("Failed to read log {}", self.path.display()))?;
            let line = line.trim();
            if !line.is_empty() {
                entries.insert(line.to_string());
            }
        }
        Ok(entries)
    }

    /// Append one entry, creating the file if needed. The file is opened
    /// per entry so every finished write survives an interrupted run.
    pub fn append(&self, entry: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open log {} for append", self.path.display()))?;
        writeln!(file, "{}", entry)
            .with_context(|| format!("Failed to append to log {}", self.path.display()))?;
        Ok(())
    }
}

/// The success and failure logs of one upload target.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub uploaded: LogFile,
    pub failed: LogFile,
}

impl Ledger {
    pub fn new(uploaded: impl Into<PathBuf>, failed: impl Into<PathBuf>) -> Self {
        Ledger {
            uploaded: LogFile::new(uploaded),
            failed: LogFile::new(failed),
        }
    }
}
