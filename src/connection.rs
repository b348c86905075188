//! The connection execution engine.
//!
//! A [`Connection`] wraps one write [`DriverHandle`] and optionally one read
//! handle, and funnels every data-touching operation through a single run
//! pipeline: reconnect-if-missing, execute, wrap failures as
//! [`Error::Query`], retry exactly once on a lost-connection signature, then
//! record timing in the query log.
//!
//! # Architecture
//!
//! Each public operation contributes a small work unit (its core
//! statement-execution logic) implementing [`QueryWork`]; the pipeline wraps
//! all of them uniformly. Dialect differences are data, not subclasses: a
//! [`Dialect`] profile selected at construction time.

use crate::config::ConnectionConfig;
use crate::dialect::{Dialect, TransactionStyle};
use crate::driver::DriverHandle;
use crate::error::{DbResult, Error};
use crate::models::{FetchMode, QueryLogEntry, Row, Value};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Capability that rebuilds a Connection's handle(s) in place after link
/// loss. Installed by the factory; absent on hand-assembled Connections
/// unless set explicitly.
#[async_trait]
pub trait Reconnector: Send + Sync {
    async fn reconnect(&self, connection: &mut Connection) -> DbResult<()>;
}

/// A logical database connection.
///
/// Holds the write handle, the optional read handle, and the transaction /
/// dry-run / logging state machines. One Connection is used by one caller
/// context at a time; operations take `&mut self` and there is no internal
/// locking.
pub struct Connection {
    write_handle: Option<Box<dyn DriverHandle>>,
    read_handle: Option<Box<dyn DriverHandle>>,
    reconnector: Option<Arc<dyn Reconnector>>,
    dialect: Dialect,
    database: String,
    table_prefix: String,
    config: ConnectionConfig,
    fetch_mode: FetchMode,
    /// Open transaction depth. Only 0->1 issues a physical begin and only
    /// 1->0 issues a physical commit/rollback.
    transactions: u32,
    query_log: Vec<QueryLogEntry>,
    logging_queries: bool,
    pretending: bool,
}

impl Connection {
    /// Create a connection around an open write handle.
    pub fn new(
        handle: Box<dyn DriverHandle>,
        dialect: Dialect,
        database: impl Into<String>,
        table_prefix: impl Into<String>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            write_handle: Some(handle),
            read_handle: None,
            reconnector: None,
            dialect,
            database: database.into(),
            table_prefix: table_prefix.into(),
            config,
            fetch_mode: FetchMode::default(),
            transactions: 0,
            query_log: Vec::new(),
            logging_queries: false,
            pretending: false,
        }
    }

    // =========================================================================
    // Statement operations
    // =========================================================================

    /// Run a select and return the first row, if any.
    pub async fn select_one(&mut self, query: &str, bindings: &[Value]) -> DbResult<Option<Row>> {
        let mut records = self.select(query, bindings).await?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.remove(0))
        })
    }

    /// Run a select against the read handle.
    pub async fn select(&mut self, query: &str, bindings: &[Value]) -> DbResult<Vec<Row>> {
        self.select_with(query, bindings, true).await
    }

    /// Run a select forced onto the write handle.
    pub async fn select_from_write(
        &mut self,
        query: &str,
        bindings: &[Value],
    ) -> DbResult<Vec<Row>> {
        self.select_with(query, bindings, false).await
    }

    /// Run a select, choosing the handle explicitly.
    ///
    /// With `use_read_handle` the effective read handle applies: the write
    /// handle whenever a transaction is open, otherwise the configured read
    /// handle, otherwise the write handle.
    pub async fn select_with(
        &mut self,
        query: &str,
        bindings: &[Value],
        use_read_handle: bool,
    ) -> DbResult<Vec<Row>> {
        self.run(query, bindings, &SelectWork { use_read_handle }).await
    }

    /// Run an insert statement.
    pub async fn insert(&mut self, query: &str, bindings: &[Value]) -> DbResult<bool> {
        self.statement(query, bindings).await
    }

    /// Run an update statement and return the affected-row count.
    pub async fn update(&mut self, query: &str, bindings: &[Value]) -> DbResult<u64> {
        self.affecting_statement(query, bindings).await
    }

    /// Run a delete statement and return the affected-row count.
    pub async fn delete(&mut self, query: &str, bindings: &[Value]) -> DbResult<u64> {
        self.affecting_statement(query, bindings).await
    }

    /// Run an arbitrary prepared write statement.
    pub async fn statement(&mut self, query: &str, bindings: &[Value]) -> DbResult<bool> {
        self.run(query, bindings, &StatementWork).await
    }

    /// Run a prepared statement and return the affected-row count.
    pub async fn affecting_statement(&mut self, query: &str, bindings: &[Value]) -> DbResult<u64> {
        self.run(query, bindings, &AffectingWork).await
    }

    /// Run a raw statement with no bind parameters.
    pub async fn unprepared(&mut self, query: &str) -> DbResult<bool> {
        self.run(query, &[], &UnpreparedWork).await
    }

    /// Normalize bound values for execution: date-times format with the
    /// dialect's canonical pattern, boolean `false` coerces to integer `0`,
    /// everything else passes through unchanged.
    pub fn prepare_bindings(&self, bindings: &[Value]) -> Vec<Value> {
        bindings
            .iter()
            .map(|value| match value {
                Value::DateTime(dt) => {
                    Value::String(dt.format(self.dialect.date_format).to_string())
                }
                Value::Bool(false) => Value::Int(0),
                other => other.clone(),
            })
            .collect()
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `work` inside a transaction: begin, commit on success, roll back
    /// and re-raise on any error.
    pub async fn transaction<T, F>(&mut self, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        if self.dialect.transaction_style == TransactionStyle::SqlServerTran
            && self.driver_name()? != self.dialect.name
        {
            return self.transaction_with_raw_tran(work).await;
        }

        self.begin_transaction().await?;

        let outcome = match work(self).await {
            Ok(value) => self.commit().await.map(|_| value),
            Err(error) => Err(error),
        };

        match outcome {
            Ok(value) => Ok(value),
            Err(error) => {
                self.rollback().await?;
                Err(error)
            }
        }
    }

    /// Transaction issuance for a SQL Server dialect running on a secondary
    /// driver: raw TRAN statements against the write handle, no depth
    /// bookkeeping.
    async fn transaction_with_raw_tran<T, F>(&mut self, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        self.write_handle_ref()?.exec_raw("BEGIN TRAN").await?;

        match work(self).await {
            Ok(value) => {
                self.write_handle_ref()?.exec_raw("COMMIT TRAN").await?;
                Ok(value)
            }
            Err(error) => {
                self.write_handle_ref()?.exec_raw("ROLLBACK TRAN").await?;
                Err(error)
            }
        }
    }

    /// Increment transaction depth, issuing the physical begin only on 0->1.
    pub async fn begin_transaction(&mut self) -> DbResult<()> {
        self.transactions += 1;

        if self.transactions == 1 {
            self.write_handle_ref()?.begin().await?;
            debug!(name = %self.name(), "Transaction started");
        }

        Ok(())
    }

    /// Issue the physical commit only at depth 1, then decrement.
    pub async fn commit(&mut self) -> DbResult<()> {
        if self.transactions == 1 {
            self.write_handle_ref()?.commit().await?;
            debug!(name = %self.name(), "Transaction committed");
        }

        self.transactions = self.transactions.saturating_sub(1);
        Ok(())
    }

    /// Issue the physical rollback and reset depth at depth 1; at greater
    /// depth only decrement. A nested rollback is bookkeeping only: no
    /// savepoint exists to release, so the inner abort intent reaches the
    /// database only if the outermost frame also rolls back.
    pub async fn rollback(&mut self) -> DbResult<()> {
        if self.transactions == 1 {
            self.transactions = 0;
            self.write_handle_ref()?.rollback().await?;
            debug!(name = %self.name(), "Transaction rolled back");
        } else {
            self.transactions = self.transactions.saturating_sub(1);
        }

        Ok(())
    }

    /// Current transaction nesting depth.
    pub fn transaction_level(&self) -> u32 {
        self.transactions
    }

    // =========================================================================
    // Dry-run mode
    // =========================================================================

    /// Execute `work` in dry-run mode and return the statements it would have
    /// issued, in order.
    ///
    /// While active, selects return no rows and writes report success without
    /// touching the database, but every call still flows through the logging
    /// step. Entering clears the log and enables logging; the prior logging
    /// flag is restored on exit, error or not.
    pub async fn pretend<F>(&mut self, work: F) -> DbResult<Vec<QueryLogEntry>>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, DbResult<()>> + Send,
    {
        let logging_queries = self.logging_queries;

        self.enable_query_log();
        self.pretending = true;
        self.query_log.clear();

        let result = work(self).await;

        self.pretending = false;
        self.logging_queries = logging_queries;

        result?;
        Ok(self.query_log.clone())
    }

    /// Whether the connection is currently in a dry run.
    pub fn pretending(&self) -> bool {
        self.pretending
    }

    // =========================================================================
    // Handles, reconnection, lifecycle
    // =========================================================================

    /// Mark the connection disconnected by dropping both handles. The next
    /// operation triggers reconnection.
    pub fn disconnect(&mut self) -> DbResult<()> {
        self.set_write_handle(None)?;
        self.set_read_handle(None)?;
        Ok(())
    }

    /// Rebuild the handle(s) via the configured reconnector.
    pub async fn reconnect(&mut self) -> DbResult<()> {
        let Some(reconnector) = self.reconnector.clone() else {
            return Err(Error::lost_connection(
                "Lost connection and no reconnector available.",
            ));
        };

        info!(name = %self.name(), "Reconnecting");
        reconnector.reconnect(self).await
    }

    /// Replace the write handle. `None` marks the connection disconnected.
    pub fn set_write_handle(&mut self, handle: Option<Box<dyn DriverHandle>>) -> DbResult<&mut Self> {
        if self.transactions >= 1 {
            return Err(Error::illegal_state(
                "Can't swap driver handle while within transaction.",
            ));
        }

        self.write_handle = handle;
        Ok(self)
    }

    /// Replace the read handle.
    pub fn set_read_handle(&mut self, handle: Option<Box<dyn DriverHandle>>) -> DbResult<&mut Self> {
        if self.transactions >= 1 {
            return Err(Error::illegal_state(
                "Can't swap driver handle while within transaction.",
            ));
        }

        self.read_handle = handle;
        Ok(self)
    }

    /// Install the reconnect strategy.
    pub fn set_reconnector(&mut self, reconnector: Arc<dyn Reconnector>) -> &mut Self {
        self.reconnector = Some(reconnector);
        self
    }

    /// Live driver name reported by the write handle.
    pub fn driver_name(&self) -> DbResult<&str> {
        Ok(self.write_handle_ref()?.driver_name())
    }

    /// Whether a write handle is currently attached.
    pub fn is_connected(&self) -> bool {
        self.write_handle.is_some()
    }

    /// Whether a dedicated read handle is attached.
    pub fn has_read_handle(&self) -> bool {
        self.read_handle.is_some()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Logical connection name from the configuration.
    pub fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or("")
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    pub fn set_fetch_mode(&mut self, fetch_mode: FetchMode) {
        self.fetch_mode = fetch_mode;
    }

    // =========================================================================
    // Query log
    // =========================================================================

    /// Recorded statements, oldest first.
    pub fn query_log(&self) -> &[QueryLogEntry] {
        &self.query_log
    }

    pub fn enable_query_log(&mut self) {
        self.logging_queries = true;
    }

    pub fn disable_query_log(&mut self) {
        self.logging_queries = false;
    }

    pub fn flush_query_log(&mut self) {
        self.query_log.clear();
    }

    /// Whether statements are being recorded.
    pub fn logging(&self) -> bool {
        self.logging_queries
    }

    /// Append a log entry, if logging is enabled. Bindings are recorded as
    /// supplied by the caller, before normalization.
    pub fn log_query(&mut self, query: &str, bindings: &[Value], time: f64) {
        if !self.logging_queries {
            return;
        }

        self.query_log.push(QueryLogEntry {
            query: query.to_string(),
            bindings: bindings.to_vec(),
            time,
        });
    }

    // =========================================================================
    // Run pipeline
    // =========================================================================

    /// The single execution pipeline every statement operation funnels
    /// through.
    async fn run<W>(&mut self, query: &str, bindings: &[Value], work: &W) -> DbResult<W::Output>
    where
        W: QueryWork + Sync,
    {
        self.reconnect_if_missing_connection().await?;

        let start = Instant::now();

        let result = match self.run_query_work(query, bindings, work).await {
            Ok(value) => Ok(value),
            Err(error) => {
                self.try_again_if_caused_by_lost_connection(error, query, bindings, work)
                    .await
            }
        };

        let time = elapsed_ms(start);
        debug!(query = %query, time_ms = time, ok = result.is_ok(), "Statement finished");
        self.log_query(query, bindings, time);

        result
    }

    /// Execute one work unit, wrapping any failure with the statement text
    /// and normalized bindings.
    async fn run_query_work<W>(
        &self,
        query: &str,
        bindings: &[Value],
        work: &W,
    ) -> DbResult<W::Output>
    where
        W: QueryWork + Sync,
    {
        work.execute(self, query, bindings)
            .await
            .map_err(|error| Error::query(query, self.prepare_bindings(bindings), error))
    }

    /// Retry exactly once after a reconnect when the failure matches the
    /// lost-connection signature set. The retry result propagates
    /// unconditionally.
    async fn try_again_if_caused_by_lost_connection<W>(
        &mut self,
        error: Error,
        query: &str,
        bindings: &[Value],
        work: &W,
    ) -> DbResult<W::Output>
    where
        W: QueryWork + Sync,
    {
        if error.caused_by_lost_connection() {
            warn!(name = %self.name(), query = %query, "Lost connection; reconnecting for a single retry");
            self.reconnect().await?;

            return self.run_query_work(query, bindings, work).await;
        }

        Err(error)
    }

    /// Reconnect before executing when the write handle has been dropped,
    /// e.g. after an explicit disconnect.
    async fn reconnect_if_missing_connection(&mut self) -> DbResult<()> {
        if self.write_handle.is_none() {
            self.reconnect().await?;
        }

        Ok(())
    }

    fn write_handle_ref(&self) -> DbResult<&dyn DriverHandle> {
        self.write_handle
            .as_deref()
            .ok_or_else(|| Error::lost_connection("Connection is not open."))
    }

    /// Effective read handle: the write handle whenever a transaction is
    /// open, otherwise the configured read handle, otherwise the write
    /// handle.
    fn read_handle_ref(&self) -> DbResult<&dyn DriverHandle> {
        if self.transactions >= 1 {
            return self.write_handle_ref();
        }

        match self.read_handle.as_deref() {
            Some(handle) => Ok(handle),
            None => self.write_handle_ref(),
        }
    }

    fn handle_for_select(&self, use_read_handle: bool) -> DbResult<&dyn DriverHandle> {
        if use_read_handle {
            self.read_handle_ref()
        } else {
            self.write_handle_ref()
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name())
            .field("dialect", &self.dialect.name)
            .field("database", &self.database)
            .field("transactions", &self.transactions)
            .field("pretending", &self.pretending)
            .field("logging_queries", &self.logging_queries)
            .field("connected", &self.write_handle.is_some())
            .field("has_read_handle", &self.read_handle.is_some())
            .finish_non_exhaustive()
    }
}

/// One operation's core statement-execution logic, wrapped uniformly by the
/// run pipeline.
#[async_trait]
trait QueryWork: Send {
    type Output: Send;

    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        bindings: &[Value],
    ) -> DbResult<Self::Output>;
}

struct SelectWork {
    use_read_handle: bool,
}

#[async_trait]
impl QueryWork for SelectWork {
    type Output = Vec<Row>;

    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        bindings: &[Value],
    ) -> DbResult<Vec<Row>> {
        if connection.pretending() {
            return Ok(Vec::new());
        }

        let handle = connection.handle_for_select(self.use_read_handle)?;
        let bound = connection.prepare_bindings(bindings);

        handle.query(query, &bound, connection.fetch_mode()).await
    }
}

struct StatementWork;

#[async_trait]
impl QueryWork for StatementWork {
    type Output = bool;

    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        bindings: &[Value],
    ) -> DbResult<bool> {
        if connection.pretending() {
            return Ok(true);
        }

        let bound = connection.prepare_bindings(bindings);
        connection.write_handle_ref()?.execute(query, &bound).await?;

        Ok(true)
    }
}

struct AffectingWork;

#[async_trait]
impl QueryWork for AffectingWork {
    type Output = u64;

    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        bindings: &[Value],
    ) -> DbResult<u64> {
        if connection.pretending() {
            return Ok(0);
        }

        let bound = connection.prepare_bindings(bindings);
        connection.write_handle_ref()?.execute(query, &bound).await
    }
}

struct UnpreparedWork;

#[async_trait]
impl QueryWork for UnpreparedWork {
    type Output = bool;

    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        _bindings: &[Value],
    ) -> DbResult<bool> {
        if connection.pretending() {
            return Ok(true);
        }

        let affected = connection.write_handle_ref()?.exec_raw(query).await?;

        Ok(affected != 0)
    }
}

/// Elapsed milliseconds rounded to two decimal places.
fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect;
    use chrono::NaiveDate;

    struct NullHandle;

    #[async_trait]
    impl DriverHandle for NullHandle {
        async fn query(
            &self,
            _statement: &str,
            _bindings: &[Value],
            _mode: FetchMode,
        ) -> DbResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn execute(&self, _statement: &str, _bindings: &[Value]) -> DbResult<u64> {
            Ok(0)
        }

        async fn exec_raw(&self, _statement: &str) -> DbResult<u64> {
            Ok(0)
        }

        async fn begin(&self) -> DbResult<()> {
            Ok(())
        }

        async fn commit(&self) -> DbResult<()> {
            Ok(())
        }

        async fn rollback(&self) -> DbResult<()> {
            Ok(())
        }

        fn driver_name(&self) -> &str {
            "mysql"
        }
    }

    fn connection() -> Connection {
        Connection::new(
            Box::new(NullHandle),
            dialect::MYSQL,
            "app",
            "",
            ConnectionConfig::new("mysql"),
        )
    }

    #[test]
    fn test_prepare_bindings_formats_datetimes() {
        let conn = connection();
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap();

        let bound = conn.prepare_bindings(&[Value::DateTime(dt)]);
        assert_eq!(bound, vec![Value::String("2024-03-09 14:30:05".to_string())]);
    }

    #[test]
    fn test_prepare_bindings_coerces_false_only() {
        let conn = connection();
        let bound = conn.prepare_bindings(&[
            Value::Bool(false),
            Value::Bool(true),
            Value::Int(7),
            Value::from("x"),
            Value::Null,
        ]);

        assert_eq!(
            bound,
            vec![
                Value::Int(0),
                Value::Bool(true),
                Value::Int(7),
                Value::from("x"),
                Value::Null,
            ]
        );
    }

    #[tokio::test]
    async fn test_handle_swap_refused_mid_transaction() {
        let mut conn = connection();
        conn.begin_transaction().await.unwrap();

        let err = conn.set_write_handle(Some(Box::new(NullHandle))).unwrap_err();
        assert!(matches!(err, Error::IllegalState { .. }));
        assert_eq!(conn.transaction_level(), 1);
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_rollback_never_underflows() {
        let mut conn = connection();
        conn.rollback().await.unwrap();
        assert_eq!(conn.transaction_level(), 0);
    }

    #[test]
    fn test_log_query_respects_logging_flag() {
        let mut conn = connection();
        conn.log_query("select 1", &[], 0.1);
        assert!(conn.query_log().is_empty());

        conn.enable_query_log();
        conn.log_query("select 1", &[], 0.1);
        assert_eq!(conn.query_log().len(), 1);
    }
}
