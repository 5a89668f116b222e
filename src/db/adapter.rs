//! The uniform database handle.
//!
//! One [`Database`] is constructed per process by the bootstrap and shared
//! by reference across all callers. Every operation returns through the
//! [`DbResult`] channel; nothing is silently swallowed here.

use futures_util::future::BoxFuture;
use tracing::warn;

use crate::config::{DbConfig, EngineKind};
use crate::db::executor::{self, ExecuteResult};
use crate::db::pool::DbPool;
use crate::db::retry::RetryPolicy;
use crate::db::transaction::{DbTransaction, TransactionScope};
use crate::db::value::{Row, SqlValue};
use crate::error::{DbError, DbResult};

/// Handle to one backend, closed over its connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
    retry: RetryPolicy,
}

impl Database {
    /// Connect to the engine the configuration selects.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        let pool = DbPool::connect(config).await?;
        Ok(Self {
            pool,
            retry: RetryPolicy::default(),
        })
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.pool.engine_kind()
    }

    /// Every matching row; an empty vec when nothing matches.
    pub async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        self.ensure_open()?;
        executor::fetch_all(&self.pool, sql, params, self.retry).await
    }

    /// The first matching row, or `None` for zero rows.
    pub async fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> DbResult<Option<Row>> {
        self.ensure_open()?;
        executor::fetch_one(&self.pool, sql, params, self.retry).await
    }

    /// Run an INSERT/UPDATE/DELETE. Never retried, even on MySQL: a
    /// statement that partially applied before a connection drop must not
    /// be applied twice.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> DbResult<ExecuteResult> {
        self.ensure_open()?;
        executor::execute(&self.pool, sql, params).await
    }

    /// Run DDL or administrative statements with no bound parameters.
    pub async fn execute_raw(&self, sql: &str) -> DbResult<()> {
        self.ensure_open()?;
        executor::execute_raw(&self.pool, sql).await
    }

    /// Run `f` inside a transaction bound to one checked-out connection.
    /// Commits when the callback returns `Ok`, rolls back when it returns
    /// `Err` and surfaces the callback's error.
    pub async fn with_transaction<T, F>(&self, f: F) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut TransactionScope) -> BoxFuture<'t, DbResult<T>>,
    {
        self.ensure_open()?;
        let tx = match &self.pool {
            DbPool::Sqlite(p) => DbTransaction::Sqlite(p.begin().await?),
            DbPool::Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            DbPool::MySql(p) => DbTransaction::MySql(p.begin().await?),
        };
        let mut scope = TransactionScope::new(tx);
        match f(&mut scope).await {
            Ok(value) => {
                scope.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = scope.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Close the underlying pool. Idempotent; any later operation fails
    /// with [`DbError::Closed`].
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn ensure_open(&self) -> DbResult<()> {
        if self.pool.is_closed() {
            return Err(DbError::Closed);
        }
        Ok(())
    }
}
