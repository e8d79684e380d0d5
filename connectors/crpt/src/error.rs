//! CRPT error types.

use std::time::Duration;

use crpt_ratelimit::RateLimitError;
use thiserror::Error;

/// Result type for CRPT operations.
pub type CrptResult<T> = Result<T, CrptError>;

/// CRPT-specific errors.
#[derive(Debug, Error)]
pub enum CrptError {
    /// The caller stopped waiting for a free slot; nothing was sent
    #[error("Admission cancelled after waiting {waited:?}")]
    AdmissionCancelled {
        /// Time spent waiting before giving up
        waited: Duration,
    },

    /// HTTP/network error
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Registry rejected the document
    #[error("Registry error {code} (HTTP {status}): {message}")]
    Registry {
        /// HTTP status code
        status: u16,
        /// Registry error code
        code: String,
        /// Registry error message
        message: String,
        /// Registry error details
        description: String,
    },

    /// Registry answered with a body matching neither response shape
    #[error("Malformed registry response (HTTP {status}): {source}")]
    MalformedResponse {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
        /// Parse failure
        #[source]
        source: serde_json::Error,
    },

    /// The exchange was cancelled after the request had been admitted
    #[error("Submission aborted while in flight")]
    Aborted,

    /// Document could not be serialized
    #[error("JSON error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Form body could not be encoded
    #[error("Form encoding error: {0}")]
    FormEncoding(#[from] serde_urlencoded::ser::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CrptError {
    /// Stable error code, the registry's own for registry errors.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::AdmissionCancelled { .. } => "ADMISSION_CANCELLED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Registry { code, .. } => code,
            Self::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            Self::Aborted => "ABORTED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::FormEncoding(_) => "FORM_ENCODING_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Human-readable details beyond the message.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Registry { description, .. } => description.clone(),
            Self::MalformedResponse { body, .. } => body.clone(),
            Self::Transport(e) if e.is_timeout() => "request timed out".into(),
            Self::Transport(e) if e.is_connect() => "connection failed".into(),
            _ => String::new(),
        }
    }

    /// Whether the request never produced a registry response.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether nothing was sent because admission was abandoned.
    #[must_use]
    pub const fn is_admission_cancelled(&self) -> bool {
        matches!(self, Self::AdmissionCancelled { .. })
    }
}

impl From<RateLimitError> for CrptError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Cancelled { waited }
            | RateLimitError::WaitExceeded { waited, .. } => Self::AdmissionCancelled { waited },
            RateLimitError::InvalidConfig(msg) => Self::Config(msg),
        }
    }
}
