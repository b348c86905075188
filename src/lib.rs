//! db-link
//!
//! A connection abstraction layer above native SQL drivers. One logical
//! [`Connection`] wraps a write link and optionally a read link, and adds
//! nested-transaction bookkeeping, reconnect-and-retry on transient link
//! loss, a dry-run mode that captures generated SQL, and query timing/logging.

pub mod config;
pub mod connection;
pub mod connectors;
pub mod dialect;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod factory;
pub mod models;
pub mod registry;

pub use config::{ConnectionConfig, ReplicaConfig, RoleOverrides};
pub use connection::{Connection, Reconnector};
pub use driver::DriverHandle;
pub use error::{DbResult, Error};
pub use factory::{ConnectionFactory, ReplicaSelector};
pub use models::{FetchMode, QueryLogEntry, Row, Value};
pub use registry::ConnectionRegistry;
