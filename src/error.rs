//! Error types for db-link.
//!
//! All errors are defined with `thiserror`. The taxonomy mirrors the layers of
//! the crate: configuration and driver-resolution failures surface immediately,
//! statement failures are wrapped as [`Error::Query`] (the sole retry
//! boundary), and state-machine violations surface as
//! [`Error::LostConnection`] / [`Error::IllegalState`].

use crate::models::Value;
use thiserror::Error;

/// Driver error messages that classify a failure as transient link loss.
///
/// A [`Error::Query`] whose cause message contains any of these substrings is
/// eligible for exactly one reconnect-and-retry cycle.
pub const LOST_CONNECTION_MESSAGES: &[&str] = &[
    "server has gone away",
    "no connection to the server",
    "Lost connection",
];

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration key.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The `driver` value maps to no known connector or dialect.
    #[error("Unsupported driver [{driver}]")]
    UnsupportedDriver { driver: String },

    /// A statement failed during execution. Carries the statement text, the
    /// normalized bindings, and the underlying driver failure.
    #[error("{source} (SQL: {statement})")]
    Query {
        statement: String,
        bindings: Vec<Value>,
        #[source]
        source: Box<Error>,
    },

    /// Reconnection was required but no reconnector is configured.
    #[error("{message}")]
    LostConnection { message: String },

    /// An operation was attempted in a state that forbids it, e.g. swapping a
    /// handle while a transaction is open.
    #[error("{message}")]
    IllegalState { message: String },

    /// Failure reported by the underlying driver.
    #[error("{message}")]
    Driver { message: String },
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unsupported-driver error.
    pub fn unsupported_driver(driver: impl Into<String>) -> Self {
        Self::UnsupportedDriver {
            driver: driver.into(),
        }
    }

    /// Wrap an execution failure with its statement and normalized bindings.
    pub fn query(statement: impl Into<String>, bindings: Vec<Value>, source: Error) -> Self {
        Self::Query {
            statement: statement.into(),
            bindings,
            source: Box::new(source),
        }
    }

    /// Create a lost-connection error.
    pub fn lost_connection(message: impl Into<String>) -> Self {
        Self::LostConnection {
            message: message.into(),
        }
    }

    /// Create an illegal-state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Check whether this error is a [`Error::Query`] whose cause matches the
    /// lost-connection signature set.
    pub fn caused_by_lost_connection(&self) -> bool {
        match self {
            Self::Query { source, .. } => {
                let message = source.to_string();
                LOST_CONNECTION_MESSAGES
                    .iter()
                    .any(|needle| message.contains(needle))
            }
            _ => false,
        }
    }
}

/// Convert sqlx errors into driver-layer errors.
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => Error::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => Error::driver(db_err.message().to_string()),
            sqlx::Error::Io(io_err) => Error::driver(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => Error::driver(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => Error::driver(format!("Protocol error: {}", msg)),
            other => Error::driver(other.to_string()),
        }
    }
}

/// Result type alias for db-link operations.
pub type DbResult<T> = Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display_includes_sql() {
        let err = Error::query(
            "select * from users",
            vec![],
            Error::driver("syntax error"),
        );
        let text = err.to_string();
        assert!(text.contains("syntax error"));
        assert!(text.contains("select * from users"));
    }

    #[test]
    fn test_lost_connection_signature_matches() {
        let err = Error::query(
            "select 1",
            vec![],
            Error::driver("MySQL server has gone away"),
        );
        assert!(err.caused_by_lost_connection());
    }

    #[test]
    fn test_lost_connection_signature_rejects_other_causes() {
        let err = Error::query("select 1", vec![], Error::driver("syntax error near '1'"));
        assert!(!err.caused_by_lost_connection());
    }

    #[test]
    fn test_non_query_errors_never_match_signature() {
        assert!(!Error::driver("server has gone away").caused_by_lost_connection());
        assert!(!Error::lost_connection("server has gone away").caused_by_lost_connection());
    }
}
