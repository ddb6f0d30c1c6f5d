/*!
 * Error types for the panelglot application.
 *
 * Providers report raw failures as `ProviderError`. The request orchestrator
 * classifies each failure exactly once into an `ErrorKind` and surfaces an
 * `OrchestratorError`, which is the only error type callers above the
 * orchestrator ever observe.
 */

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Classified failure kind shared by every layer above the providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused, DNS failure, reset
    Network,
    /// The call did not settle before its deadline
    Timeout,
    /// The remote side asked us to slow down (HTTP 429)
    RateLimit,
    /// Credentials rejected (HTTP 401/403)
    Auth,
    /// The request itself is malformed (HTTP 400)
    InvalidRequest,
    /// Remote failure (HTTP 5xx)
    Server,
    /// Anything we cannot classify
    Unknown,
    /// The orchestrator was shut down while the call was pending
    Cancelled,
}

impl ErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            400 => Self::InvalidRequest,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }

    /// Whether a failure of this kind is worth another attempt
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::Server
        )
    }

    /// Short remediation hint for the UI layer
    pub fn remediation_hint(self) -> &'static str {
        match self {
            Self::Network => "check the network connection and try again",
            Self::Timeout => "the service is slow to respond, try again or raise the timeout",
            Self::RateLimit => "too many requests, wait a moment or lower the request budget",
            Self::Auth => "update credentials",
            Self::InvalidRequest => "the request was rejected, check the model and provider settings",
            Self::Server => "the provider is having trouble, try again later",
            Self::Unknown => "unexpected failure, see the logs for details",
            Self::Cancelled => "the operation was cancelled",
        }
    }

    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::Server => "server",
            Self::Unknown => "unknown",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// The call did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Message from the API
        message: String,
        /// Seconds the API asked us to wait, if it said so
        retry_after_secs: Option<u64>,
    },

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The provider configuration is unusable
    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    /// The provider does not offer the requested capability
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Classify this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RequestFailed(_) | Self::ConnectionError(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimit,
            Self::AuthenticationError(_) => ErrorKind::Auth,
            Self::InvalidConfig(_) => ErrorKind::InvalidRequest,
            Self::ApiError { status_code, .. } => ErrorKind::from_status(*status_code),
            Self::ParseError(_) | Self::Unsupported(_) => ErrorKind::Unknown,
        }
    }

    /// Wait hint supplied by the remote side, if any
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else if let Some(status) = error.status() {
            Self::ApiError {
                status_code: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Classified error surfaced by the request orchestrator
///
/// Carries only the kind, the operation name, and the number of attempts,
/// never the raw transport failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed ({kind}) after {attempts} attempt(s): {message}")]
pub struct OrchestratorError {
    /// Classified failure kind
    pub kind: ErrorKind,
    /// Operation that failed (e.g. "detect_text")
    pub operation: String,
    /// Number of attempts made, including the first
    pub attempts: u32,
    /// Human readable description of the last failure
    pub message: String,
}

impl OrchestratorError {
    /// Create a new classified error
    pub fn new(
        kind: ErrorKind,
        operation: impl Into<String>,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Classify a provider failure
    pub fn from_provider(operation: impl Into<String>, attempts: u32, error: &ProviderError) -> Self {
        Self::new(error.kind(), operation, attempts, error.to_string())
    }

    /// Error for an operation interrupted by shutdown
    pub fn cancelled(operation: impl Into<String>, attempts: u32) -> Self {
        Self::new(ErrorKind::Cancelled, operation, attempts, "orchestrator shut down")
    }

    /// Whether the failure was worth retrying
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Errors raised by the batch state machine
#[derive(Error, Debug)]
pub enum BatchError {
    /// A run is already in progress or has finished on this processor
    #[error("Batch cannot start while {0}")]
    NotIdle(String),

    /// The host could not enumerate targets
    #[error("Failed to enumerate targets: {0}")]
    Enumeration(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the orchestrator
    #[error("Request error: {0}")]
    Request(#[from] OrchestratorError),

    /// Error from the batch processor
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    /// Configuration problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
