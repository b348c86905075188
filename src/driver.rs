//! The narrow interface this crate consumes from the native SQL layer.
//!
//! A [`DriverHandle`] is one live physical link. Handles are owned by exactly
//! one [`Connection`](crate::connection::Connection) (write role) or referenced
//! by one as its read handle; they are never shared across Connections.
//! Implementations use interior mutability around the link they own, so all
//! methods take `&self`.

use crate::error::DbResult;
use crate::models::{FetchMode, Row, Value};
use async_trait::async_trait;

/// One live physical database link.
#[async_trait]
pub trait DriverHandle: Send + Sync {
    /// Execute a prepared query with bound values and return its rows, shaped
    /// per `mode`.
    async fn query(
        &self,
        statement: &str,
        bindings: &[Value],
        mode: FetchMode,
    ) -> DbResult<Vec<Row>>;

    /// Execute a prepared statement with bound values; returns the
    /// affected-row count.
    async fn execute(&self, statement: &str, bindings: &[Value]) -> DbResult<u64>;

    /// Execute a raw statement without bind parameters; returns the
    /// affected-row count.
    async fn exec_raw(&self, statement: &str) -> DbResult<u64>;

    /// Open a transaction on this link.
    async fn begin(&self) -> DbResult<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> DbResult<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> DbResult<()>;

    /// Live driver name attribute, e.g. "mysql" or "sqlsrv".
    fn driver_name(&self) -> &str;
}
