//! Scoped transactions.
//!
//! A [`TransactionScope`] is a short-lived handle bound to one connection
//! checked out from the pool for the duration of a callback. Statements
//! inside the scope never interleave with other callers, and on MySQL they
//! bypass the retry wrapper: a transaction must fail atomically, not
//! silently retry mid-flight.

use sqlx::{MySql, Postgres, Sqlite, Transaction};

use crate::db::executor::{ExecuteResult, postgres::rewrite_placeholders};
use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::value::{DecodeRow, Row, SqlValue};
use crate::error::{DbError, DbResult};

pub(crate) enum DbTransaction {
    Sqlite(Transaction<'static, Sqlite>),
    Postgres(Transaction<'static, Postgres>),
    MySql(Transaction<'static, MySql>),
}

/// Adapter-shaped view over one exclusively-owned connection.
pub struct TransactionScope {
    tx: DbTransaction,
}

impl TransactionScope {
    pub(crate) fn new(tx: DbTransaction) -> Self {
        Self { tx }
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<Row>> {
        match &mut self.tx {
            DbTransaction::Sqlite(tx) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_sqlite_param(query, param);
                }
                let rows = query.fetch_all(&mut **tx).await?;
                Ok(rows.iter().map(DecodeRow::decode_row).collect())
            }
            DbTransaction::Postgres(tx) => {
                let sql = rewrite_placeholders(sql);
                let mut query = sqlx::query(&sql);
                for param in params {
                    query = bind_postgres_param(query, param);
                }
                let rows = query.fetch_all(&mut **tx).await?;
                Ok(rows.iter().map(DecodeRow::decode_row).collect())
            }
            DbTransaction::MySql(tx) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_mysql_param(query, param);
                }
                let rows = query.fetch_all(&mut **tx).await?;
                Ok(rows.iter().map(DecodeRow::decode_row).collect())
            }
        }
    }

    pub async fn fetch_one(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Option<Row>> {
        match &mut self.tx {
            DbTransaction::Sqlite(tx) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_sqlite_param(query, param);
                }
                let row = query.fetch_optional(&mut **tx).await?;
                Ok(row.map(|row| row.decode_row()))
            }
            DbTransaction::Postgres(tx) => {
                let sql = rewrite_placeholders(sql);
                let mut query = sqlx::query(&sql);
                for param in params {
                    query = bind_postgres_param(query, param);
                }
                let row = query.fetch_optional(&mut **tx).await?;
                Ok(row.map(|row| row.decode_row()))
            }
            DbTransaction::MySql(tx) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_mysql_param(query, param);
                }
                let row = query.fetch_optional(&mut **tx).await?;
                Ok(row.map(|row| row.decode_row()))
            }
        }
    }

    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<ExecuteResult> {
        match &mut self.tx {
            DbTransaction::Sqlite(tx) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_sqlite_param(query, param);
                }
                let result = query.execute(&mut **tx).await?;
                let rowid = result.last_insert_rowid();
                Ok(ExecuteResult {
                    rows_affected: result.rows_affected(),
                    inserted_id: (rowid != 0).then_some(rowid),
                })
            }
            DbTransaction::Postgres(tx) => {
                let sql = rewrite_placeholders(sql);
                let mut query = sqlx::query(&sql);
                for param in params {
                    query = bind_postgres_param(query, param);
                }
                let result = query.execute(&mut **tx).await?;
                Ok(ExecuteResult {
                    rows_affected: result.rows_affected(),
                    inserted_id: None,
                })
            }
            DbTransaction::MySql(tx) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_mysql_param(query, param);
                }
                let result = query.execute(&mut **tx).await?;
                let id = result.last_insert_id();
                Ok(ExecuteResult {
                    rows_affected: result.rows_affected(),
                    inserted_id: (id != 0).then_some(id as i64),
                })
            }
        }
    }

    pub(crate) async fn commit(self) -> DbResult<()> {
        match self.tx {
            DbTransaction::Sqlite(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::MySql(tx) => tx.commit().await.map_err(DbError::from),
        }
    }

    pub(crate) async fn rollback(self) -> DbResult<()> {
        match self.tx {
            DbTransaction::Sqlite(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::MySql(tx) => tx.rollback().await.map_err(DbError::from),
        }
    }
}
