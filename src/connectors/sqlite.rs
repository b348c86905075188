//! SQLite connector.

use super::{Connector, cache_capacity, merge_options, require};
use crate::config::ConnectionConfig;
use crate::driver::DriverHandle;
use crate::drivers::SqliteHandle;
use crate::error::{DbResult, Error};
use async_trait::async_trait;
use sqlx::ConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const DEFAULT_OPTIONS: &[(&str, &str)] = &[("statement_cache_capacity", "100")];

pub struct SqliteConnector;

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn DriverHandle>> {
        let database = require(config.database.as_deref(), "database")?;
        let options = merge_options(DEFAULT_OPTIONS, &config.options);

        let mut connect_options = if database == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(Error::from)?
        } else {
            // The database file must already exist; this layer never creates it
            if !Path::new(database).exists() {
                return Err(Error::configuration("Database does not exist."));
            }
            SqliteConnectOptions::new().filename(database)
        };

        if let Some(capacity) = cache_capacity(&options)? {
            connect_options = connect_options.statement_cache_capacity(capacity);
        }

        debug!(database = %database, "Opening SQLite connection");
        let conn = connect_options.connect().await.map_err(Error::from)?;

        Ok(Box::new(SqliteHandle::new(conn)))
    }
}
