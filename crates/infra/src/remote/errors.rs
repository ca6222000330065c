//! Remote-call error types
//!
//! Provides error classification for remote operations with retry
//! metadata. The sweep scheduler consults `should_retry` when deciding
//! whether a document is worth re-entering.

use taxbridge_domain::TaxBridgeError;
use thiserror::Error;

/// Categories of remote errors for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteErrorCategory {
    /// Authentication errors (401, 403) - retry after token refresh
    Authentication,
    /// Rate limiting errors (429) - retry with backoff
    RateLimit,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth) - non-retryable
    Client,
    /// Network/connection errors - retryable
    Network,
    /// Configuration errors - non-retryable
    Config,
}

/// Remote operation errors
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),
}

impl RemoteError {
    /// Classify a non-success HTTP status into a remote error.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimit(message),
            400..=499 => Self::Client(message),
            500..=599 => Self::Server(message),
            _ => Self::Network(message),
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> RemoteErrorCategory {
        match self {
            Self::Auth(_) => RemoteErrorCategory::Authentication,
            Self::RateLimit(_) => RemoteErrorCategory::RateLimit,
            Self::Server(_) => RemoteErrorCategory::Server,
            Self::Client(_) => RemoteErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => RemoteErrorCategory::Network,
            Self::Config(_) => RemoteErrorCategory::Config,
        }
    }

    /// Check if this error should be retried
    pub fn should_retry(&self) -> bool {
        matches!(
            self.category(),
            RemoteErrorCategory::Authentication
                | RemoteErrorCategory::RateLimit
                | RemoteErrorCategory::Server
                | RemoteErrorCategory::Network
        )
    }

    /// Get suggested retry delay in seconds
    pub fn retry_delay_secs(&self) -> u64 {
        match self.category() {
            RemoteErrorCategory::Authentication => 5, // Quick retry after token refresh
            RemoteErrorCategory::RateLimit => 60,     // Wait for rate limit window
            RemoteErrorCategory::Server => 10,        // Moderate delay for server issues
            RemoteErrorCategory::Network => 5,        // Quick retry for network
            RemoteErrorCategory::Client | RemoteErrorCategory::Config => 0, // No retry
        }
    }
}

/// Convert from TaxBridgeError to RemoteError
impl From<TaxBridgeError> for RemoteError {
    fn from(err: TaxBridgeError) -> Self {
        match err {
            TaxBridgeError::Config(message) | TaxBridgeError::InvalidInput(message) => {
                Self::Config(message)
            }
            TaxBridgeError::Transport(message) => Self::Network(message),
            TaxBridgeError::Auth(message) => Self::Auth(message),
            TaxBridgeError::NotFound(message) => Self::Client(message),
            TaxBridgeError::Reconciliation(message)
            | TaxBridgeError::Database(message)
            | TaxBridgeError::Internal(message) => Self::Server(message),
        }
    }
}

/// Convert back into the domain error at pipeline boundaries.
impl From<RemoteError> for TaxBridgeError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Auth(message) => Self::Auth(message),
            RemoteError::Config(message) => Self::Config(message),
            RemoteError::Client(message) => Self::InvalidInput(message),
            RemoteError::RateLimit(message)
            | RemoteError::Server(message)
            | RemoteError::Network(message) => Self::Transport(message),
            RemoteError::Timeout(duration) => {
                Self::Transport(format!("request timed out after {duration:?}"))
            }
        }
    }
}
