//! Connection registry.
//!
//! An explicitly owned registry of logical connections keyed by pool name:
//! create-on-first-use through the factory, explicit teardown. Hosting
//! applications own the registry's lifecycle; there is no process-global
//! state.

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::DbResult;
use crate::factory::ConnectionFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

#[derive(Clone)]
pub struct ConnectionRegistry {
    factory: Arc<ConnectionFactory>,
    connections: Arc<RwLock<HashMap<String, Arc<Mutex<Connection>>>>>,
}

impl ConnectionRegistry {
    /// Create a registry building connections through `factory`.
    pub fn new(factory: ConnectionFactory) -> Self {
        Self {
            factory: Arc::new(factory),
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the connection registered under `name`, building it from `config`
    /// on first use.
    pub async fn get(
        &self,
        name: &str,
        config: ConnectionConfig,
    ) -> DbResult<Arc<Mutex<Connection>>> {
        // Fast path
        {
            let connections = self.connections.read().await;
            if let Some(connection) = connections.get(name) {
                return Ok(Arc::clone(connection));
            }
        }

        let connection = self.factory.make(config, name).await?;

        // Re-check after async work; a concurrent build for the same name
        // wins and the fresh connection is dropped
        let mut connections = self.connections.write().await;
        if let Some(existing) = connections.get(name) {
            return Ok(Arc::clone(existing));
        }

        info!(name = %name, "Registered connection");
        let connection = Arc::new(Mutex::new(connection));
        connections.insert(name.to_string(), Arc::clone(&connection));

        Ok(connection)
    }

    /// Look up a registered connection without building one.
    pub async fn lookup(&self, name: &str) -> Option<Arc<Mutex<Connection>>> {
        let connections = self.connections.read().await;
        connections.get(name).cloned()
    }

    /// Check if a connection is registered.
    pub async fn exists(&self, name: &str) -> bool {
        let connections = self.connections.read().await;
        connections.contains_key(name)
    }

    /// Names of all registered connections.
    pub async fn names(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        connections.keys().cloned().collect()
    }

    /// Number of registered connections.
    pub async fn count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Drop the named connection from the registry and disconnect it.
    pub async fn disconnect(&self, name: &str) -> DbResult<()> {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(name)
        };

        if let Some(connection) = removed {
            info!(name = %name, "Disconnecting connection");
            connection.lock().await.disconnect()?;
        }

        Ok(())
    }

    /// Disconnect every registered connection and clear the registry.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<Mutex<Connection>>)> = {
            let mut connections = self.connections.write().await;
            connections.drain().collect()
        };

        for (name, connection) in drained {
            info!(name = %name, "Disconnecting connection");
            // Best effort; a connection mid-transaction keeps its handles
            let _ = connection.lock().await.disconnect();
        }

        info!("All connections closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let registry = ConnectionRegistry::new(ConnectionFactory::new());
        assert_eq!(registry.count().await, 0);
        assert!(registry.lookup("main").await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_unknown_name_is_noop() {
        let registry = ConnectionRegistry::new(ConnectionFactory::new());
        registry.disconnect("missing").await.unwrap();
    }
}
