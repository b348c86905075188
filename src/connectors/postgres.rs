//! PostgreSQL connector.

use super::{Connector, cache_capacity, merge_options, require};
use crate::config::ConnectionConfig;
use crate::driver::DriverHandle;
use crate::drivers::PostgresHandle;
use crate::error::{DbResult, Error};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{ConnectOptions, Executor};
use tracing::debug;

const DEFAULT_OPTIONS: &[(&str, &str)] = &[("statement_cache_capacity", "100")];

pub struct PostgresConnector;

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn DriverHandle>> {
        let database = require(config.database.as_deref(), "database")?;
        let charset = require(config.charset.as_deref(), "charset")?;
        let options = merge_options(DEFAULT_OPTIONS, &config.options);

        let mut connect_options = PgConnectOptions::new().database(database);

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
        if let Some(sslmode) = config.sslmode.as_deref() {
            let mode: PgSslMode = sslmode
                .parse()
                .map_err(|_| Error::configuration(format!("Invalid sslmode [{sslmode}].")))?;
            connect_options = connect_options.ssl_mode(mode);
        }
        if let Some(name) = options.get("application_name") {
            connect_options = connect_options.application_name(name);
        }
        if let Some(capacity) = cache_capacity(&options)? {
            connect_options = connect_options.statement_cache_capacity(capacity);
        }

        debug!(database = %database, "Opening PostgreSQL connection");
        let mut conn = connect_options.connect().await.map_err(Error::from)?;

        run_setup(&mut conn, config, charset).await?;

        Ok(Box::new(PostgresHandle::new(conn)))
    }
}

/// Post-connect setup statements, in order: encoding, timezone, search path.
async fn run_setup(conn: &mut PgConnection, config: &ConnectionConfig, charset: &str) -> DbResult<()> {
    let names = format!("set names '{charset}'");
    (&mut *conn).execute(names.as_str()).await.map_err(Error::from)?;

    if let Some(timezone) = config.timezone.as_deref() {
        let statement = format!("set time zone '{timezone}'");
        (&mut *conn)
            .execute(statement.as_str())
            .await
            .map_err(Error::from)?;
    }

    if let Some(schema) = config.schema.as_deref() {
        let statement = format!("set search_path to {schema}");
        (&mut *conn)
            .execute(statement.as_str())
            .await
            .map_err(Error::from)?;
    }

    Ok(())
}
