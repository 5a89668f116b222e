//! Database abstraction layer.
//!
//! This module provides the uniform adapter over the three engines:
//! - Connection pool construction per engine
//! - Query execution with dialect normalization
//! - Scoped transactions bound to one connection
//! - Bounded retry for transient MySQL faults
//! - Idempotent schema convergence
//! - One-time process bootstrap

pub mod adapter;
pub mod bootstrap;
pub mod executor;
pub mod params;
pub mod pool;
pub mod retry;
pub mod schema;
pub mod transaction;
pub mod value;

pub use adapter::Database;
pub use bootstrap::Bootstrap;
pub use executor::ExecuteResult;
pub use pool::DbPool;
pub use retry::RetryPolicy;
pub use schema::SchemaEngine;
pub use transaction::TransactionScope;
pub use value::{Row, SqlValue};
