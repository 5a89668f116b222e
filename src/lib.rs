//! cortexdb
//!
//! Data-access layer that lets one application codebase run unmodified
//! against SQLite, PostgreSQL and MySQL, and converge its schema forward
//! on every process start without hand-run migrations.

pub mod config;
pub mod db;
pub mod error;

pub use config::{DbConfig, EngineKind, PoolOptions, RunMode};
pub use db::{
    Bootstrap, Database, ExecuteResult, Row, SchemaEngine, SqlValue, TransactionScope,
};
pub use error::{DbError, DbResult};
