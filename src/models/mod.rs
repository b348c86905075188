//! Data models shared across the crate.

pub mod value;

pub use value::{FetchMode, QueryLogEntry, Row, Value};
