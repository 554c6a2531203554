use thiserror::Error;

use crate::model::JobStatus;
use crate::sync::SyncFailure;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Endpoint unreachable or answered with a non-2xx status.
    #[error("Network failure on {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    /// The request succeeded but carried no payload.
    #[error("No data available: {0}")]
    NoData(String),

    /// A response arrived after its target stopped being observed.
    #[error("Stale response for generation {generation} (current {current})")]
    StaleTarget { generation: u64, current: u64 },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A loud pull failed; carries the kind and cause as the coordinator saw them.
    #[error("{0}")]
    Pull(SyncFailure),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Invalid job transition from {from} to {to}")]
    InvalidJobTransition { from: JobStatus, to: JobStatus },

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

impl Error {
    pub fn network(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Network {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a job-specific failure may be retried against the global endpoints.
    pub fn is_fallback_candidate(&self) -> bool {
        matches!(
            self,
            Error::Network { .. } | Error::Http(_) | Error::Timeout(_) | Error::MalformedPayload(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
