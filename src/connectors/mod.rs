//! Connectors: configuration in, open driver handle out.
//!
//! Each connector builds dialect-specific connect options from config fields,
//! merges its default driver options with caller overrides (caller wins on
//! key collision), opens the physical link, then runs the dialect's setup
//! statements before the handle is returned. A setup failure propagates as a
//! connection failure; no partial handle escapes.

pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;

pub use mysql::MySqlConnector;
pub use postgres::PostgresConnector;
pub use sqlite::SqliteConnector;
pub use sqlserver::SqlServerConnector;

use crate::config::ConnectionConfig;
use crate::driver::DriverHandle;
use crate::error::{DbResult, Error};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Opens one physical link described by a role config.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn DriverHandle>>;
}

/// Resolve the connector variant for a driver kind.
pub fn connector_for(driver: &str) -> DbResult<Arc<dyn Connector>> {
    match driver {
        "mysql" => Ok(Arc::new(MySqlConnector)),
        "pgsql" => Ok(Arc::new(PostgresConnector)),
        "sqlite" => Ok(Arc::new(SqliteConnector)),
        "sqlsrv" => Ok(Arc::new(SqlServerConnector)),
        other => Err(Error::unsupported_driver(other)),
    }
}

/// Merge connector default options with caller-supplied overrides; the
/// caller wins on key collision.
pub fn merge_options(
    defaults: &[(&str, &str)],
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged: HashMap<String, String> = defaults
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }

    merged
}

/// Fetch a required config value, or fail with a configuration error naming
/// the missing key.
pub(crate) fn require<'a>(value: Option<&'a str>, key: &str) -> DbResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::configuration(format!("Missing required configuration key [{key}].")))
}

/// Parse the `statement_cache_capacity` driver option, when present.
pub(crate) fn cache_capacity(options: &HashMap<String, String>) -> DbResult<Option<usize>> {
    match options.get("statement_cache_capacity") {
        None => Ok(None),
        Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
            Error::configuration(format!(
                "Invalid statement_cache_capacity [{raw}]; expected an integer."
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_options_caller_wins() {
        let mut overrides = HashMap::new();
        overrides.insert("statement_cache_capacity".to_string(), "25".to_string());
        overrides.insert("extra".to_string(), "x".to_string());

        let merged = merge_options(&[("statement_cache_capacity", "100")], &overrides);
        assert_eq!(
            merged.get("statement_cache_capacity").map(String::as_str),
            Some("25")
        );
        assert_eq!(merged.get("extra").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_merge_options_defaults_survive() {
        let merged = merge_options(&[("statement_cache_capacity", "100")], &HashMap::new());
        assert_eq!(
            merged.get("statement_cache_capacity").map(String::as_str),
            Some("100")
        );
    }

    #[test]
    fn test_connector_for_unknown_driver() {
        let err = connector_for("mongodb").unwrap_err();
        assert!(matches!(err, Error::UnsupportedDriver { .. }));
    }

    #[test]
    fn test_require_rejects_missing_and_empty() {
        assert!(require(None, "database").is_err());
        assert!(require(Some(""), "database").is_err());
        assert_eq!(require(Some("app"), "database").unwrap(), "app");
    }

    #[test]
    fn test_cache_capacity_parses() {
        let mut options = HashMap::new();
        assert_eq!(cache_capacity(&options).unwrap(), None);

        options.insert("statement_cache_capacity".to_string(), "64".to_string());
        assert_eq!(cache_capacity(&options).unwrap(), Some(64));

        options.insert("statement_cache_capacity".to_string(), "lots".to_string());
        assert!(cache_capacity(&options).is_err());
    }
}
