use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures talking to the assessment backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {message}")]
    Status {
        endpoint: &'static str,
        status: u16,
        message: String,
    },

    #[error("unexpected response from {endpoint}: {message}")]
    Malformed {
        endpoint: &'static str,
        message: String,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// Whether the server rejected our credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ApiError::Status { status: 401, .. } | ApiError::Auth(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not logged in; run `learning-diagnostics login` first")]
    MissingToken,

    #[error("credential expired at {0}; run `learning-diagnostics login` again")]
    Expired(DateTime<Utc>),

    #[error("credential store error: {0}")]
    Store(#[from] std::io::Error),

    #[error("credential file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}
