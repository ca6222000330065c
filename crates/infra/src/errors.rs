//! Conversions from external infrastructure errors into domain errors.

use taxbridge_domain::TaxBridgeError;

/// Error newtype that keeps conversions on the infrastructure side and can
/// be converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TaxBridgeError);

impl From<InfraError> for TaxBridgeError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TaxBridgeError> for InfraError {
    fn from(value: TaxBridgeError) -> Self {
        InfraError(value)
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TaxBridgeError */
/* -------------------------------------------------------------------------- */

impl From<reqwest::Error> for InfraError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return InfraError(TaxBridgeError::Transport("HTTP request timed out".into()));
        }

        if value.is_connect() {
            return InfraError(TaxBridgeError::Transport("HTTP connection failure".into()));
        }

        if let Some(status) = value.status() {
            let code = status.as_u16();
            let message = format!(
                "HTTP {} {}",
                code,
                status.canonical_reason().unwrap_or("unknown status")
            );

            let mapped = match code {
                401 | 403 => TaxBridgeError::Auth(message),
                404 => TaxBridgeError::NotFound(message),
                400..=499 => TaxBridgeError::InvalidInput(message),
                _ => TaxBridgeError::Transport(message),
            };
            return InfraError(mapped);
        }

        InfraError(TaxBridgeError::Transport(value.to_string()))
    }
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TaxBridgeError */
/* -------------------------------------------------------------------------- */

impl From<rusqlite::Error> for InfraError {
    fn from(value: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        let mapped = match value {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => TaxBridgeError::Database("database is busy".into()),
                    ErrorCode::DatabaseLocked => {
                        TaxBridgeError::Database("database is locked".into())
                    }
                    ErrorCode::ConstraintViolation => {
                        TaxBridgeError::Database(format!("constraint violation: {message}"))
                    }
                    _ => TaxBridgeError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => {
                TaxBridgeError::NotFound("no rows returned by query".into())
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                TaxBridgeError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                TaxBridgeError::Database(format!("invalid column type: {ty}"))
            }
            other => TaxBridgeError::Database(other.to_string()),
        };

        InfraError(mapped)
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → TaxBridgeError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(TaxBridgeError::Database(format!("connection pool error: {value}")))
    }
}
