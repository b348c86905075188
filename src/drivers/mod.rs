//! Driver handle implementations.
//!
//! Each submodule wraps one physical link behind the [`DriverHandle`]
//! contract: a single dedicated connection (never a pool), guarded by a
//! `tokio::sync::Mutex`, so transaction state stays on one link.
//!
//! The code structure across the sqlx-backed modules is intentionally
//! parallel to make dialect differences obvious.
//!
//! [`DriverHandle`]: crate::driver::DriverHandle

#[cfg(feature = "mssql")]
pub mod mssql;
pub mod mysql;
pub mod postgres;
mod row;
pub mod sqlite;

pub use mysql::MySqlHandle;
pub use postgres::PostgresHandle;
pub use sqlite::SqliteHandle;

#[cfg(feature = "mssql")]
pub use mssql::SqlServerHandle;
