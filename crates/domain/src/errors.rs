//! Error taxonomy for the network core.
//!
//! Every failed operation surfaces as exactly one [`ClientError`] variant.
//! The taxonomy is deliberately closed: retry and notification policy key
//! off the variant, never off raw transport text.

use std::time::Duration;

use thiserror::Error;

/// Coarse classification used by retry and notification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credential problems (expired token, failed renewal, CSRF rejection)
    Authentication,
    /// Server-reported quota exhaustion (429) - never retried
    RateLimit,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx, unparseable bodies) - non-retryable
    Client,
    /// Transport problems (timeout, no network) - retryable
    Network,
    /// Setup or policy problems (cross-origin, bad builder input) - non-retryable
    Config,
}

/// Main error type for Forgelink network operations.
///
/// `Clone` is required so a single-flight renewal outcome can be handed to
/// every caller awaiting the same operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network unreachable")]
    Offline,

    #[error("authentication expired")]
    AuthExpired,

    #[error("session renewal failed: {0}")]
    AuthRenewalFailed(String),

    #[error("rate limited")]
    RateLimited { reset_after: Option<Duration> },

    #[error("request rejected ({status}): {message}")]
    ValidationRejected { status: u16, message: String },

    #[error("anti-forgery token rejected")]
    CsrfRejected,

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("cross-origin request blocked: {origin} -> {url}")]
    CrossOriginBlocked { origin: String, url: String },

    #[error("malformed response body: {0}")]
    MalformedResponse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Get the error category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthExpired | Self::AuthRenewalFailed(_) | Self::CsrfRejected => {
                ErrorCategory::Authentication
            }
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Server { .. } => ErrorCategory::Server,
            Self::ValidationRejected { .. } | Self::MalformedResponse(_) => ErrorCategory::Client,
            Self::Timeout(_) | Self::Offline => ErrorCategory::Network,
            Self::CrossOriginBlocked { .. } | Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Whether the executor may retry the failed attempt locally.
    ///
    /// Rate limiting and cross-origin rejections are intentionally excluded:
    /// retrying cannot change a quota or policy outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Offline | Self::Server { .. })
    }

    /// Reset hint supplied by the server on a 429, when present.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { reset_after } => *reset_after,
            _ => None,
        }
    }

    /// Human-readable notification text for terminal failures.
    ///
    /// Derived from the error kind rather than raw transport text, except for
    /// validation rejections whose server-supplied message is safe to show.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(_) => "The server took too long to respond. Please try again.".into(),
            Self::Offline => "Network unreachable. Check your connection.".into(),
            Self::AuthExpired | Self::AuthRenewalFailed(_) => {
                "Your session has expired. Please sign in again.".into()
            }
            Self::RateLimited { reset_after: Some(reset) } => {
                format!("Too many requests. Try again in {} seconds.", reset.as_secs())
            }
            Self::RateLimited { reset_after: None } => {
                "Too many requests. Try again later.".into()
            }
            Self::ValidationRejected { message, .. } if !message.is_empty() => message.clone(),
            Self::ValidationRejected { status, .. } => {
                format!("The request was rejected ({status}).")
            }
            Self::CsrfRejected => "The request could not be verified. Please retry.".into(),
            Self::Server { .. } => "The server hit an internal error. Please try again later.".into(),
            Self::CrossOriginBlocked { .. } => {
                "The application is not configured for this server.".into()
            }
            Self::MalformedResponse(_) => "Received an unexpected response from the server.".into(),
            Self::Config(message) => message.clone(),
        }
    }
}

/// Result type alias for Forgelink network operations.
pub type Result<T> = std::result::Result<T, ClientError>;
