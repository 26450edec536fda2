// API client module: the upload capability the batch runner depends on, and
// a small blocking HTTP client implementing it against Roboflow's REST API.
// Everything is synchronous; one request is in flight at a time.

use crate::config::RemoteConfig;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Why a single upload attempt failed.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Network(String),

    #[error("server answered {status}: {body}")]
    Http { status: u16, body: String },

    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl UploadError {
    /// Short error kind shown next to each failed attempt.
    pub fn category(&self) -> &'static str {
        match self {
            UploadError::Io(_) => "IoError",
            UploadError::Network(_) => "NetworkError",
            UploadError::Http { .. } => "HttpError",
            UploadError::Rejected(_) => "Rejected",
            UploadError::UnexpectedResponse(_) => "UnexpectedResponse",
        }
    }

    /// Errors that retrying cannot fix: unreadable files, explicit
    /// rejections and client errors other than timeouts and rate limits.
    pub fn is_permanent(&self) -> bool {
        match self {
            UploadError::Io(_) | UploadError::Rejected(_) => true,
            UploadError::Http { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            UploadError::Network(_) | UploadError::UnexpectedResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key as a query parameter.
        UploadError::Network(err.without_url().to_string())
    }
}

/// The single operation the batch runner needs from the remote service.
pub trait Uploader {
    /// Transmit one file. Any error is reported to the caller, which decides
    /// whether to retry.
    fn upload(&self, path: &Path) -> Result<(), UploadError>;
}

/// Body returned by the upload endpoint.
#[derive(Deserialize, Debug, Default)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    duplicate: bool,
    id: Option<String>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct ProjectResponse {
    project: Option<ProjectSummary>,
}

#[derive(Deserialize, Debug)]
struct ProjectSummary {
    name: Option<String>,
    images: Option<u64>,
}

/// Blocking client bound to one workspace/project pair.
#[derive(Clone)]
pub struct RoboflowClient {
    client: Client,
    config: RemoteConfig,
}

impl RoboflowClient {
    /// Build the HTTP client and check that the workspace and project are
    /// reachable with the configured key. Failing here is fatal for the run.
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let url = project_url(config);
        let res = client
            .get(&url)
            .query(&[("api_key", config.api_key.expose())])
            .send()
            .map_err(|e| e.without_url())
            .context("Failed to reach the dataset service")?;
        if !res.status().is_success() {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            anyhow::bail!(
                "Cannot open project {}/{}: {} - {}",
                config.workspace,
                config.project,
                status,
                txt
            );
        }

        match res.json::<ProjectResponse>() {
            Ok(ProjectResponse { project: Some(p) }) => info!(
                name = p.name.as_deref().unwrap_or(config.project.as_str()),
                images = p.images,
                "connected to project"
            ),
            Ok(_) => info!(project = %config.project, "connected to project"),
            Err(e) => debug!(error = %e, "project info was not in the expected shape"),
        }

        Ok(RoboflowClient {
            client,
            config: config.clone(),
        })
    }
}

impl Uploader for RoboflowClient {
    /// Send the image base64-encoded as the request body, which is what the
    /// dataset upload endpoint expects.
    fn upload(&self, path: &Path) -> Result<(), UploadError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let res = self
            .client
            .post(upload_url(&self.config))
            .query(&[
                ("api_key", self.config.api_key.expose()),
                ("name", file_name.as_str()),
                ("split", self.config.split.as_str()),
            ])
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(STANDARD.encode(bytes))
            .send()?;

        let status = res.status();
        let txt = res.text().unwrap_or_else(|_| "".into());
        interpret_response(status, &txt)
    }
}

fn project_url(config: &RemoteConfig) -> String {
    format!("{}/{}/{}", config.api_url, config.workspace, config.project)
}

fn upload_url(config: &RemoteConfig) -> String {
    format!("{}/dataset/{}/upload", config.api_url, config.project)
}

/// Map a finished HTTP exchange to the attempt's result. A duplicate counts
/// as success because the service already holds the image.
fn interpret_response(status: StatusCode, body: &str) -> Result<(), UploadError> {
    if !status.is_success() {
        return Err(UploadError::Http {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    let resp: UploadResponse = serde_json::from_str(body)
        .map_err(|e| UploadError::UnexpectedResponse(format!("{}: {}", e, body)))?;
    if let Some(err) = resp.error {
        let msg = match &err {
            serde_json::Value::String(s) => s.clone(),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        };
        return Err(UploadError::Rejected(msg));
    }
    if resp.success || resp.duplicate {
        debug!(id = resp.id.as_deref(), duplicate = resp.duplicate, "upload acknowledged");
        return Ok(());
    }
    Err(UploadError::UnexpectedResponse(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;
    use std::time::Duration;

    fn remote() -> RemoteConfig {
        RemoteConfig {
            api_url: "https://api.example.test".into(),
            workspace: "cats".into(),
            project: "food-classes".into(),
            split: "train".into(),
            timeout: Duration::from_secs(5),
            api_key: ApiKey::new("k"),
        }
    }

    #[test]
    fn endpoint_urls() {
        let config = remote();
        assert_eq!(project_url(&config), "https://api.example.test/cats/food-classes");
        assert_eq!(upload_url(&config), "https://api.example.test/dataset/food-classes/upload");
    }

    #[test]
    fn success_and_duplicate_are_accepted() {
        assert!(interpret_response(StatusCode::OK, r#"{"success": true, "id": "abc"}"#).is_ok());
        assert!(interpret_response(StatusCode::OK, r#"{"duplicate": true, "id": "abc"}"#).is_ok());
    }

    #[test]
    fn error_body_is_a_rejection() {
        let err = interpret_response(StatusCode::OK, r#"{"error": {"message": "bad image"}}"#)
            .unwrap_err();
        assert!(matches!(err, UploadError::Rejected(ref m) if m == "bad image"));
        assert!(err.is_permanent());
    }

    #[test]
    fn non_json_body_is_unexpected() {
        let err = interpret_response(StatusCode::OK, "<html>").unwrap_err();
        assert_eq!(err.category(), "UnexpectedResponse");
        assert!(!err.is_permanent());
    }

    #[test]
    fn http_status_classification() {
        let http = |status| UploadError::Http { status, body: String::new() };
        assert!(http(401).is_permanent());
        assert!(http(404).is_permanent());
        assert!(!http(408).is_permanent());
        assert!(!http(429).is_permanent());
        assert!(!http(503).is_permanent());
        assert!(!UploadError::Network("reset".into()).is_permanent());
    }

    #[test]
    fn error_status_maps_to_http_error() {
        let err = interpret_response(StatusCode::BAD_GATEWAY, "upstream").unwrap_err();
        assert!(matches!(err, UploadError::Http { status: 502, .. }));
        assert_eq!(err.category(), "HttpError");
    }
}
