// Configuration module: the clap argument parser, the compiled-in defaults
// and the validated `Config` handed to the rest of the crate. Nothing here
// is global; `main.rs` builds one `Config` and passes pieces of it down.

use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the service API key. The key is only ever
/// read from the environment, never from a flag.
pub const API_KEY_ENV: &str = "ROBOFLOW_API_KEY";

pub const DEFAULT_API_URL: &str = "https://api.roboflow.com";
pub const DEFAULT_FOLDER: &str = "train";
pub const DEFAULT_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp", ".tif", ".tiff", ".webp"];
pub const DEFAULT_UPLOADED_LOG: &str = "uploaded_files.log";
pub const DEFAULT_FAILED_LOG: &str = "failed_files.log";
pub const DEFAULT_MAX_RETRIES: u32 = 6;
pub const DEFAULT_BASE_DELAY_SECS: f64 = 2.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("environment variable ROBOFLOW_API_KEY is not set or empty")]
    MissingApiKey,

    #[error("max retries must be at least 1 (got {0})")]
    InvalidRetries(u32),

    #[error("base delay must be a finite, non-negative number of seconds (got {0})")]
    InvalidDelay(f64),

    #[error("at least one file extension is required")]
    NoExtensions,
}

/// Upload images from a folder to a Roboflow project, resuming from the
/// success log of previous runs.
#[derive(Parser, Debug)]
#[command(name = "dataset-uploader", version, about)]
pub struct Cli {
    /// Roboflow workspace identifier
    #[arg(long, env = "ROBOFLOW_WORKSPACE")]
    pub workspace: String,

    /// Roboflow project identifier
    #[arg(long, env = "ROBOFLOW_PROJECT")]
    pub project: String,

    #[arg(long, env = "ROBOFLOW_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Folder scanned (non-recursively) for images
    #[arg(long, default_value = DEFAULT_FOLDER)]
    pub folder: PathBuf,

    /// Accepted file name suffix; repeat to accept several
    #[arg(long = "ext", value_name = "SUFFIX")]
    pub extensions: Vec<String>,

    #[arg(long, default_value = DEFAULT_UPLOADED_LOG)]
    pub uploaded_log: PathBuf,

    #[arg(long, default_value = DEFAULT_FAILED_LOG)]
    pub failed_log: PathBuf,

    /// Upload attempts per file before it is marked failed
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Seconds to wait after the first failed attempt; doubles every retry
    #[arg(long, default_value_t = DEFAULT_BASE_DELAY_SECS)]
    pub base_delay: f64,

    /// Dataset split the images are uploaded into
    #[arg(long, default_value = "train")]
    pub split: String,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Give up on a file at the first error the service reports as permanent
    #[arg(long)]
    pub no_retry_permanent: bool,
}

/// API key wrapper that keeps the secret out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Retry policy applied to every file of a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per file, including the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// When false, an error classified as permanent ends the file's attempts.
    pub retry_permanent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs_f64(DEFAULT_BASE_DELAY_SECS),
            retry_permanent: true,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt `attempt` (1-based):
    /// `base_delay * 2^(attempt-1)`, saturating instead of overflowing.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.checked_mul(factor).unwrap_or(Duration::MAX)
    }
}

/// Where and how to reach the remote service.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub api_url: String,
    pub workspace: String,
    pub project: String,
    pub split: String,
    pub timeout: Duration,
    pub api_key: ApiKey,
}

/// Everything the batch session needs, independent of the remote service.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub folder: PathBuf,
    pub extensions: Vec<String>,
    pub uploaded_log: PathBuf,
    pub failed_log: PathBuf,
    pub retry: RetryPolicy,
}

impl BatchConfig {
    /// Batch settings with every compiled-in default, rooted at `folder`.
    pub fn with_defaults(folder: impl Into<PathBuf>) -> Self {
        BatchConfig {
            folder: folder.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            uploaded_log: PathBuf::from(DEFAULT_UPLOADED_LOG),
            failed_log: PathBuf::from(DEFAULT_FAILED_LOG),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub batch: BatchConfig,
}

impl Cli {
    /// Validate the parsed arguments. `api_key` is the raw value of
    /// [`API_KEY_ENV`], read by the caller.
    pub fn into_config(self, api_key: Option<String>) -> Result<Config, ConfigError> {
        let api_key = match api_key.map(|k| k.trim().to_string()) {
            Some(k) if !k.is_empty() => ApiKey::new(k),
            _ => return Err(ConfigError::MissingApiKey),
        };
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidRetries(self.max_retries));
        }
        let base_delay = Duration::try_from_secs_f64(self.base_delay)
            .map_err(|_| ConfigError::InvalidDelay(self.base_delay))?;

        let mut extensions = if self.extensions.is_empty() {
            DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
        } else {
            self.extensions
        };
        extensions.retain(|e| !e.is_empty());
        if extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }

        Ok(Config {
            remote: RemoteConfig {
                api_url: self.api_url.trim_end_matches('/').to_string(),
                workspace: self.workspace,
                project: self.project,
                split: self.split,
                timeout: Duration::from_secs(self.timeout),
                api_key,
            },
            batch: BatchConfig {
                folder: self.folder,
                extensions,
                uploaded_log: self.uploaded_log,
                failed_log: self.failed_log,
                retry: RetryPolicy {
                    max_retries: self.max_retries,
                    base_delay,
                    retry_permanent: !self.no_retry_permanent,
                },
            },
        })
    }
}
