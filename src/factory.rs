//! Connection assembly.
//!
//! The factory decides single-handle vs read/write-split topology, resolves
//! per-role configs (including random selection among replica pools), invokes
//! the right connector(s), and wires the result into a dialect-tagged
//! [`Connection`] with a reconnect strategy installed.

use crate::config::{ConnectionConfig, ReplicaConfig, RoleOverrides};
use crate::connection::{Connection, Reconnector};
use crate::connectors::{Connector, connector_for};
use crate::dialect::dialect_for;
use crate::driver::DriverHandle;
use crate::error::{DbResult, Error};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Picks one candidate out of a replica pool.
///
/// Injectable so tests can make selection deterministic.
pub trait ReplicaSelector: Send + Sync {
    /// Index into a candidate list of length `len` (`len` >= 1).
    fn pick(&self, len: usize) -> usize;
}

/// Default selector: uniform random choice.
pub struct RandomSelector;

impl ReplicaSelector for RandomSelector {
    fn pick(&self, len: usize) -> usize {
        use rand::Rng;
        rand::thread_rng().gen_range(0..len)
    }
}

/// Maps a driver kind to a connector. Swappable so tests can capture the
/// role configs a fake connector receives.
pub type ConnectorResolver = dyn Fn(&str) -> DbResult<Arc<dyn Connector>> + Send + Sync;

pub struct ConnectionFactory {
    resolver: Arc<ConnectorResolver>,
    selector: Arc<dyn ReplicaSelector>,
}

impl ConnectionFactory {
    /// Factory with the built-in connector mapping and random replica
    /// selection.
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(|driver| connector_for(driver)),
            selector: Arc::new(RandomSelector),
        }
    }

    /// Replace the connector resolver.
    pub fn with_resolver(mut self, resolver: Arc<ConnectorResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the replica selector.
    pub fn with_selector(mut self, selector: Arc<dyn ReplicaSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Build a connection for `config` under the logical name `name`.
    pub async fn make(
        &self,
        config: ConnectionConfig,
        name: impl Into<String>,
    ) -> DbResult<Connection> {
        let config = parse_config(config, name.into());

        if config.read.is_some() {
            self.create_read_write_connection(config).await
        } else {
            self.create_single_connection(config).await
        }
    }

    /// Resolve the connector for a config's driver kind.
    pub fn create_connector(&self, config: &ConnectionConfig) -> DbResult<Arc<dyn Connector>> {
        let Some(driver) = config.driver.as_deref() else {
            return Err(Error::configuration("A driver must be specified."));
        };

        (self.resolver)(driver)
    }

    async fn create_single_connection(&self, config: ConnectionConfig) -> DbResult<Connection> {
        let handle = self.create_connector(&config)?.connect(&config).await?;

        let mut connection = self.create_connection(config.clone(), handle)?;
        connection.set_reconnector(Arc::new(FactoryReconnector {
            resolver: Arc::clone(&self.resolver),
            write_config: config,
            read_config: None,
        }));

        Ok(connection)
    }

    async fn create_read_write_connection(&self, config: ConnectionConfig) -> DbResult<Connection> {
        let write_config = self.write_config(&config);
        let read_config = self.read_config(&config);

        // Write role connects first, then the read role attaches
        let write_handle = self
            .create_connector(&write_config)?
            .connect(&write_config)
            .await?;
        let mut connection = self.create_connection(write_config.clone(), write_handle)?;

        let read_handle = self
            .create_connector(&read_config)?
            .connect(&read_config)
            .await?;
        connection.set_read_handle(Some(read_handle))?;

        connection.set_reconnector(Arc::new(FactoryReconnector {
            resolver: Arc::clone(&self.resolver),
            write_config,
            read_config: Some(read_config),
        }));

        Ok(connection)
    }

    /// Wire an open handle into the dialect-tagged Connection variant.
    fn create_connection(
        &self,
        config: ConnectionConfig,
        handle: Box<dyn DriverHandle>,
    ) -> DbResult<Connection> {
        let Some(driver) = config.driver.as_deref() else {
            return Err(Error::configuration("A driver must be specified."));
        };

        let dialect = dialect_for(driver)?;
        let database = config.database().to_string();
        let prefix = config.prefix.clone().unwrap_or_default();

        Ok(Connection::new(handle, dialect, database, prefix, config))
    }

    fn write_config(&self, config: &ConnectionConfig) -> ConnectionConfig {
        self.role_config(config, config.write.as_ref())
    }

    fn read_config(&self, config: &ConnectionConfig) -> ConnectionConfig {
        self.role_config(config, config.read.as_ref())
    }

    /// Merge the chosen role override block over the base config. A pool of
    /// candidates resolves by selector choice; this is the replica-pool
    /// selection point.
    fn role_config(
        &self,
        config: &ConnectionConfig,
        replica: Option<&ReplicaConfig>,
    ) -> ConnectionConfig {
        let candidates = replica.map(ReplicaConfig::candidates).unwrap_or(&[]);

        match candidates.len() {
            0 => config.merge_role(&RoleOverrides::default()),
            1 => config.merge_role(&candidates[0]),
            len => config.merge_role(&candidates[self.selector.pick(len).min(len - 1)]),
        }
    }
}

impl Default for ConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize the incoming config: default the prefix to empty and attach the
/// logical name when absent.
fn parse_config(mut config: ConnectionConfig, name: String) -> ConnectionConfig {
    if config.prefix.is_none() {
        config.prefix = Some(String::new());
    }
    if config.name.is_none() {
        config.name = Some(name);
    }

    config
}

/// Reconnect strategy installed by the factory: re-run the connector(s)
/// against the originally resolved role configs and swap the rebuilt handles
/// in place. Replica selection is not re-run.
struct FactoryReconnector {
    resolver: Arc<ConnectorResolver>,
    write_config: ConnectionConfig,
    read_config: Option<ConnectionConfig>,
}

#[async_trait]
impl Reconnector for FactoryReconnector {
    async fn reconnect(&self, connection: &mut Connection) -> DbResult<()> {
        info!(name = %connection.name(), "Rebuilding driver handles");

        let connector = (self.resolver)(self.write_config.driver())?;
        let write_handle = connector.connect(&self.write_config).await?;
        connection.set_write_handle(Some(write_handle))?;

        if let Some(read_config) = &self.read_config {
            let connector = (self.resolver)(read_config.driver())?;
            let read_handle = connector.connect(read_config).await?;
            connection.set_read_handle(Some(read_handle))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_defaults() {
        let config = parse_config(ConnectionConfig::new("sqlite"), "main".to_string());
        assert_eq!(config.prefix.as_deref(), Some(""));
        assert_eq!(config.name.as_deref(), Some("main"));
    }

    #[test]
    fn test_parse_config_preserves_existing() {
        let config = ConnectionConfig::new("sqlite").with_prefix("app_");
        let parsed = parse_config(config, "main".to_string());
        assert_eq!(parsed.prefix.as_deref(), Some("app_"));
    }

    #[tokio::test]
    async fn test_make_requires_driver() {
        let factory = ConnectionFactory::new();
        let err = factory
            .make(ConnectionConfig::default(), "main")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_make_rejects_unknown_driver() {
        let factory = ConnectionFactory::new();
        let err = factory
            .make(ConnectionConfig::new("mongodb"), "main")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedDriver { .. }));
    }
}
