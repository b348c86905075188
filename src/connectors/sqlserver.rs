//! SQL Server connector.
//!
//! The physical driver is feature-gated: without `mssql` the connector still
//! resolves (so the driver mapping stays total) but refuses to open links.

use super::Connector;
use crate::config::ConnectionConfig;
use crate::driver::DriverHandle;
use crate::error::{DbResult, Error};
use async_trait::async_trait;

pub struct SqlServerConnector;

#[cfg(feature = "mssql")]
#[async_trait]
impl Connector for SqlServerConnector {
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn DriverHandle>> {
        use super::{merge_options, require};
        use crate::drivers::SqlServerHandle;
        use tokio_util::compat::TokioAsyncWriteCompatExt;
        use tracing::debug;

        let host = require(config.host.as_deref(), "host")?;
        let database = require(config.database.as_deref(), "database")?;
        let options = merge_options(&[], &config.options);

        let mut tconfig = tiberius::Config::new();
        tconfig.host(host);
        tconfig.port(config.port.unwrap_or(1433));
        tconfig.database(database);

        if let (Some(username), Some(password)) =
            (config.username.as_deref(), config.password.as_deref())
        {
            tconfig.authentication(tiberius::AuthMethod::sql_server(username, password));
        }
        if options.get("trust_server_certificate").map(String::as_str) == Some("true") {
            tconfig.trust_cert();
        }

        debug!(database = %database, "Opening SQL Server connection");
        let tcp = tokio::net::TcpStream::connect(tconfig.get_addr())
            .await
            .map_err(|e| Error::driver(format!("I/O error: {e}")))?;
        tcp.set_nodelay(true)
            .map_err(|e| Error::driver(format!("I/O error: {e}")))?;

        let client = tiberius::Client::connect(tconfig, tcp.compat_write())
            .await
            .map_err(|e| Error::driver(e.to_string()))?;

        Ok(Box::new(SqlServerHandle::new(client)))
    }
}

#[cfg(not(feature = "mssql"))]
#[async_trait]
impl Connector for SqlServerConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> DbResult<Box<dyn DriverHandle>> {
        Err(Error::configuration(
            "SQL Server connections require the `mssql` feature.",
        ))
    }
}
