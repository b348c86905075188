//! MySQL connector.

use super::{Connector, cache_capacity, merge_options, require};
use crate::config::ConnectionConfig;
use crate::driver::DriverHandle;
use crate::drivers::MySqlHandle;
use crate::error::{DbResult, Error};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Executor};
use tracing::debug;

const DEFAULT_OPTIONS: &[(&str, &str)] = &[("statement_cache_capacity", "100")];

pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn DriverHandle>> {
        let database = require(config.database.as_deref(), "database")?;
        let charset = require(config.charset.as_deref(), "charset")?;
        let options = merge_options(DEFAULT_OPTIONS, &config.options);

        let mut connect_options = MySqlConnectOptions::new().database(database).charset(charset);

        if let Some(host) = config.host.as_deref() {
            connect_options = connect_options.host(host);
        }
        if let Some(port) = config.port {
            connect_options = connect_options.port(port);
        }
        if let Some(username) = config.username.as_deref() {
            connect_options = connect_options.username(username);
        }
        if let Some(password) = config.password.as_deref() {
            connect_options = connect_options.password(password);
        }
        if let Some(socket) = config.unix_socket.as_deref() {
            connect_options = connect_options.socket(socket);
        }
        if let Some(collation) = config.collation.as_deref() {
            connect_options = connect_options.collation(collation);
        }
        if let Some(capacity) = cache_capacity(&options)? {
            connect_options = connect_options.statement_cache_capacity(capacity);
        }

        debug!(database = %database, "Opening MySQL connection");
        let mut conn = connect_options.connect().await.map_err(Error::from)?;

        run_setup(&mut conn, config, database, charset).await?;

        Ok(Box::new(MySqlHandle::new(conn)))
    }
}

/// Post-connect setup statements, in order: socket database selection,
/// encoding, timezone, strict mode. Any failure propagates before the handle
/// is returned.
async fn run_setup(
    conn: &mut MySqlConnection,
    config: &ConnectionConfig,
    database: &str,
    charset: &str,
) -> DbResult<()> {
    if config.unix_socket.is_some() {
        let use_db = format!("use `{database}`;");
        (&mut *conn).execute(use_db.as_str()).await.map_err(Error::from)?;
    }

    let names = match config.collation.as_deref() {
        Some(collation) => format!("set names '{charset}' collate '{collation}'"),
        None => format!("set names '{charset}'"),
    };
    (&mut *conn).execute(names.as_str()).await.map_err(Error::from)?;

    if let Some(timezone) = config.timezone.as_deref() {
        let statement = format!("set time_zone=\"{timezone}\"");
        (&mut *conn)
            .execute(statement.as_str())
            .await
            .map_err(Error::from)?;
    }

    if config.strict == Some(true) {
        (&mut *conn)
            .execute("set session sql_mode='STRICT_ALL_TABLES'")
            .await
            .map_err(Error::from)?;
    }

    Ok(())
}
