//! Dialect profiles.
//!
//! A [`Dialect`] captures the two per-engine behaviors the Connection varies
//! on: the canonical date-time bind format and how `transaction` issues
//! begin/commit/rollback. Profiles are plain data selected at construction
//! time; there is no subclassing.

use crate::error::{DbResult, Error};

/// How the scoped `transaction` helper issues transaction control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStyle {
    /// Standard begin/commit/rollback through the handle, with depth
    /// bookkeeping.
    Standard,
    /// SQL Server behavior: when the live driver name differs from the
    /// dialect's primary driver, issue raw `BEGIN TRAN`/`COMMIT TRAN`/
    /// `ROLLBACK TRAN` statements with no depth-counter interaction.
    SqlServerTran,
}

/// Per-dialect behavior profile.
#[derive(Debug, Clone, Copy)]
pub struct Dialect {
    /// Primary driver name for this dialect.
    pub name: &'static str,
    /// Canonical chrono pattern for date-time bindings.
    pub date_format: &'static str,
    pub transaction_style: TransactionStyle,
}

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const MYSQL: Dialect = Dialect {
    name: "mysql",
    date_format: DATE_FORMAT,
    transaction_style: TransactionStyle::Standard,
};

pub const POSTGRES: Dialect = Dialect {
    name: "pgsql",
    date_format: DATE_FORMAT,
    transaction_style: TransactionStyle::Standard,
};

pub const SQLITE: Dialect = Dialect {
    name: "sqlite",
    date_format: DATE_FORMAT,
    transaction_style: TransactionStyle::Standard,
};

/// SQL Server keeps a milliseconds suffix in its canonical pattern.
pub const SQL_SERVER: Dialect = Dialect {
    name: "sqlsrv",
    date_format: "%Y-%m-%d %H:%M:%S.000",
    transaction_style: TransactionStyle::SqlServerTran,
};

/// Resolve the dialect profile for a driver kind.
pub fn dialect_for(driver: &str) -> DbResult<Dialect> {
    match driver {
        "mysql" => Ok(MYSQL),
        "pgsql" => Ok(POSTGRES),
        "sqlite" => Ok(SQLITE),
        "sqlsrv" => Ok(SQL_SERVER),
        other => Err(Error::unsupported_driver(other)),
    }
}
