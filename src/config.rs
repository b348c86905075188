//! Connection configuration.
//!
//! A [`ConnectionConfig`] is parsed once per logical connection and never
//! mutated afterwards. The only derived form is the transient role config the
//! factory produces by merging the base config with a `read`/`write` override
//! block ([`ConnectionConfig::merge_role`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for one logical connection.
///
/// `driver` selects the connector and dialect; `read`/`write` switch the
/// factory into read/write-split topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Driver kind: "mysql", "pgsql", "sqlite" or "sqlsrv".
    pub driver: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
    pub timezone: Option<String>,
    /// Search path, Postgres only
    pub schema: Option<String>,
    /// Strict-mode pragma, MySQL only
    pub strict: Option<bool>,
    /// Socket path, MySQL only
    pub unix_socket: Option<String>,
    pub sslmode: Option<String>,
    /// Driver attribute overrides, merged over connector defaults
    pub options: HashMap<String, String>,
    /// Table prefix, defaulted to "" by the factory
    pub prefix: Option<String>,
    /// Logical connection name, attached by the factory
    pub name: Option<String>,
    /// Read-role override(s); presence switches to read/write topology
    pub read: Option<ReplicaConfig>,
    /// Write-role override(s)
    pub write: Option<ReplicaConfig>,
}

impl ConnectionConfig {
    /// Create a configuration for the given driver kind.
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: Some(driver.into()),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn with_unix_socket(mut self, socket: impl Into<String>) -> Self {
        self.unix_socket = Some(socket.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_read(mut self, read: ReplicaConfig) -> Self {
        self.read = Some(read);
        self
    }

    pub fn with_write(mut self, write: ReplicaConfig) -> Self {
        self.write = Some(write);
        self
    }

    /// Driver kind, or an empty string when unset.
    pub fn driver(&self) -> &str {
        self.driver.as_deref().unwrap_or("")
    }

    /// Database name, or an empty string when unset.
    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or("")
    }

    /// Merge a role override block over this config, producing the role
    /// config. Override fields win where set; `read`/`write` are stripped
    /// from the result.
    pub fn merge_role(&self, overrides: &RoleOverrides) -> ConnectionConfig {
        let mut merged = self.clone();
        merged.read = None;
        merged.write = None;

        if let Some(host) = &overrides.host {
            merged.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            merged.port = Some(port);
        }
        if let Some(database) = &overrides.database {
            merged.database = Some(database.clone());
        }
        if let Some(username) = &overrides.username {
            merged.username = Some(username.clone());
        }
        if let Some(password) = &overrides.password {
            merged.password = Some(password.clone());
        }
        if let Some(charset) = &overrides.charset {
            merged.charset = Some(charset.clone());
        }
        if let Some(collation) = &overrides.collation {
            merged.collation = Some(collation.clone());
        }
        if let Some(timezone) = &overrides.timezone {
            merged.timezone = Some(timezone.clone());
        }
        if let Some(schema) = &overrides.schema {
            merged.schema = Some(schema.clone());
        }
        if let Some(strict) = overrides.strict {
            merged.strict = Some(strict);
        }
        if let Some(socket) = &overrides.unix_socket {
            merged.unix_socket = Some(socket.clone());
        }
        if let Some(sslmode) = &overrides.sslmode {
            merged.sslmode = Some(sslmode.clone());
        }
        for (key, value) in &overrides.options {
            merged.options.insert(key.clone(), value.clone());
        }

        merged
    }
}

/// A read- or write-role configuration: one override block, or a pool of
/// candidate blocks resolved by random selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplicaConfig {
    Single(RoleOverrides),
    Pool(Vec<RoleOverrides>),
}

impl ReplicaConfig {
    /// Candidate override blocks for this role. A single block yields a
    /// one-element slice.
    pub fn candidates(&self) -> &[RoleOverrides] {
        match self {
            Self::Single(overrides) => std::slice::from_ref(overrides),
            Self::Pool(pool) => pool,
        }
    }
}

/// Partial config applied over the base for one role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
    pub timezone: Option<String>,
    pub schema: Option<String>,
    pub strict: Option<bool>,
    pub unix_socket: Option<String>,
    pub sslmode: Option<String>,
    pub options: HashMap<String, String>,
}

impl RoleOverrides {
    /// Override block changing only the host, the common replica-pool shape.
    pub fn host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_role_override_wins() {
        let base = ConnectionConfig::new("mysql")
            .with_host("primary")
            .with_database("app")
            .with_credentials("root", "secret");
        let merged = base.merge_role(&RoleOverrides::host("replica-1"));

        assert_eq!(merged.host.as_deref(), Some("replica-1"));
        assert_eq!(merged.database.as_deref(), Some("app"));
        assert_eq!(merged.username.as_deref(), Some("root"));
    }

    #[test]
    fn test_merge_role_strips_topology_keys() {
        let base = ConnectionConfig::new("mysql")
            .with_read(ReplicaConfig::Single(RoleOverrides::host("r")))
            .with_write(ReplicaConfig::Single(RoleOverrides::host("w")));
        let merged = base.merge_role(&RoleOverrides::default());

        assert!(merged.read.is_none());
        assert!(merged.write.is_none());
    }

    #[test]
    fn test_merge_role_extends_options() {
        let base = ConnectionConfig::new("mysql").with_option("a", "1").with_option("b", "2");
        let mut overrides = RoleOverrides::default();
        overrides.options.insert("b".to_string(), "3".to_string());

        let merged = base.merge_role(&overrides);
        assert_eq!(merged.options.get("a").map(String::as_str), Some("1"));
        assert_eq!(merged.options.get("b").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_replica_candidates() {
        let single = ReplicaConfig::Single(RoleOverrides::host("a"));
        assert_eq!(single.candidates().len(), 1);

        let pool = ReplicaConfig::Pool(vec![RoleOverrides::host("a"), RoleOverrides::host("b")]);
        assert_eq!(pool.candidates().len(), 2);
    }

    #[test]
    fn test_config_deserializes_read_pool() {
        let json = serde_json::json!({
            "driver": "mysql",
            "host": "primary",
            "database": "app",
            "charset": "utf8mb4",
            "read": [{"host": "replica-1"}, {"host": "replica-2"}],
            "write": {"host": "primary"}
        });
        let config: ConnectionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.read.as_ref().unwrap().candidates().len(), 2);
        assert_eq!(config.write.as_ref().unwrap().candidates().len(), 1);
    }
}
