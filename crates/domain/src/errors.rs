//! Error types used throughout the integration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for TaxBridge
///
/// Variants map to the error taxonomy of the integration pipeline:
/// configuration problems are fatal and never retried, transport problems
/// are retried by scheduled sweeps, auth problems get exactly one
/// refresh-and-retry, and reconciliation problems drive corrective
/// credit-note issuance rather than user-facing failures.
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TaxBridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for TaxBridge operations
pub type Result<T> = std::result::Result<T, TaxBridgeError>;

impl TaxBridgeError {
    /// True when the condition can only be fixed by correcting data,
    /// never by retrying the call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_fatal() {
        assert!(TaxBridgeError::Config("missing tax code".into()).is_fatal());
        assert!(TaxBridgeError::InvalidInput("bad pin".into()).is_fatal());
        assert!(!TaxBridgeError::Transport("timeout".into()).is_fatal());
        assert!(!TaxBridgeError::Auth("401".into()).is_fatal());
    }

    #[test]
    fn serializes_with_type_tag() {
        let err = TaxBridgeError::Transport("connection refused".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "Transport");
        assert_eq!(json["message"], "connection refused");
    }
}
