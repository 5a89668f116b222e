//! Uniform query execution over the three engines.
//!
//! The database-specific implementations live in submodules organized in
//! parallel so differences stay obvious:
//! - `sqlite`: passes `?` placeholders straight through
//! - `postgres`: rewrites `?` placeholders to positional `$n` first
//! - `mysql`: read operations go through the bounded retry wrapper
//!
//! Statements without parameters take the raw (unprepared) path, which also
//! lets DDL batches with multiple statements through.

use tracing::debug;

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::pool::DbPool;
use crate::db::retry::{RetryPolicy, with_retry};
use crate::db::value::{DecodeRow, Row, SqlValue};
use crate::error::{DbError, DbResult};

/// Outcome of an INSERT/UPDATE/DELETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Generated key, only when the engine reports one. SQLite and MySQL
    /// do; Postgres callers use `RETURNING` instead.
    pub inserted_id: Option<i64>,
}

pub(crate) async fn fetch_all(
    pool: &DbPool,
    sql: &str,
    params: &[SqlValue],
    retry: RetryPolicy,
) -> DbResult<Vec<Row>> {
    debug!(sql = %sql, params = params.len(), "fetch_all");
    match pool {
        DbPool::Sqlite(p) => Ok(decode_all(sqlite::fetch_rows(p, sql, params).await?)),
        DbPool::Postgres(p) => {
            let sql = postgres::rewrite_placeholders(sql);
            Ok(decode_all(postgres::fetch_rows(p, &sql, params).await?))
        }
        DbPool::MySql(p) => {
            let rows =
                with_retry(retry, "fetch_all", || mysql::fetch_rows(p, sql, params)).await?;
            Ok(decode_all(rows))
        }
    }
}

pub(crate) async fn fetch_one(
    pool: &DbPool,
    sql: &str,
    params: &[SqlValue],
    retry: RetryPolicy,
) -> DbResult<Option<Row>> {
    debug!(sql = %sql, params = params.len(), "fetch_one");
    match pool {
        DbPool::Sqlite(p) => Ok(sqlite::fetch_optional_row(p, sql, params)
            .await?
            .map(|row| row.decode_row())),
        DbPool::Postgres(p) => {
            let sql = postgres::rewrite_placeholders(sql);
            Ok(postgres::fetch_optional_row(p, &sql, params)
                .await?
                .map(|row| row.decode_row()))
        }
        DbPool::MySql(p) => {
            let row = with_retry(retry, "fetch_one", || {
                mysql::fetch_optional_row(p, sql, params)
            })
            .await?;
            Ok(row.map(|row| row.decode_row()))
        }
    }
}

pub(crate) async fn execute(
    pool: &DbPool,
    sql: &str,
    params: &[SqlValue],
) -> DbResult<ExecuteResult> {
    debug!(sql = %sql, params = params.len(), "execute");
    match pool {
        DbPool::Sqlite(p) => sqlite::execute(p, sql, params).await,
        DbPool::Postgres(p) => {
            let sql = postgres::rewrite_placeholders(sql);
            postgres::execute(p, &sql, params).await
        }
        DbPool::MySql(p) => mysql::execute(p, sql, params).await,
    }
}

/// Run DDL or administrative statements without bound parameters.
pub(crate) async fn execute_raw(pool: &DbPool, sql: &str) -> DbResult<()> {
    use sqlx::Executor;
    debug!(sql = %sql, "execute_raw");
    match pool {
        DbPool::Sqlite(p) => {
            p.execute(sql).await?;
        }
        DbPool::Postgres(p) => {
            p.execute(sql).await?;
        }
        DbPool::MySql(p) => {
            p.execute(sql).await?;
        }
    }
    Ok(())
}

fn decode_all<R: DecodeRow>(rows: Vec<R>) -> Vec<Row> {
    rows.iter().map(DecodeRow::decode_row).collect()
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

pub(crate) mod sqlite {
    use super::*;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Vec<SqliteRow>> {
        if params.is_empty() {
            use sqlx::Executor;
            pool.fetch_all(sql).await.map_err(DbError::from)
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.fetch_all(pool).await.map_err(DbError::from)
        }
    }

    pub async fn fetch_optional_row(
        pool: &SqlitePool,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Option<SqliteRow>> {
        if params.is_empty() {
            use sqlx::Executor;
            pool.fetch_optional(sql).await.map_err(DbError::from)
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.fetch_optional(pool).await.map_err(DbError::from)
        }
    }

    pub async fn execute(
        pool: &SqlitePool,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<ExecuteResult> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        let result = query.execute(pool).await?;
        let rowid = result.last_insert_rowid();
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            inserted_id: (rowid != 0).then_some(rowid),
        })
    }
}

pub(crate) mod postgres {
    use super::*;
    use sqlx::PgPool;
    use sqlx::postgres::PgRow;

    /// Replace each `?` placeholder with `$1`, `$2`, ... left to right.
    ///
    /// The rewrite is purely textual and order-preserving, so one
    /// positional parameter array works for every dialect. Placeholders
    /// inside quoted literals and quoted identifiers are left alone.
    pub fn rewrite_placeholders(sql: &str) -> String {
        let mut out = String::with_capacity(sql.len() + 8);
        let mut n = 0u32;
        let mut in_single = false;
        let mut in_double = false;
        for c in sql.chars() {
            match c {
                '\'' if !in_double => {
                    in_single = !in_single;
                    out.push(c);
                }
                '"' if !in_single => {
                    in_double = !in_double;
                    out.push(c);
                }
                '?' if !in_single && !in_double => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(c),
            }
        }
        out
    }

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Vec<PgRow>> {
        if params.is_empty() {
            use sqlx::Executor;
            pool.fetch_all(sql).await.map_err(DbError::from)
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.fetch_all(pool).await.map_err(DbError::from)
        }
    }

    pub async fn fetch_optional_row(
        pool: &PgPool,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Option<PgRow>> {
        if params.is_empty() {
            use sqlx::Executor;
            pool.fetch_optional(sql).await.map_err(DbError::from)
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.fetch_optional(pool).await.map_err(DbError::from)
        }
    }

    pub async fn execute(
        pool: &PgPool,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<ExecuteResult> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        let result = query.execute(pool).await?;
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            inserted_id: None,
        })
    }
}

pub(crate) mod mysql {
    use super::*;
    use sqlx::MySqlPool;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Vec<MySqlRow>> {
        if params.is_empty() {
            use sqlx::Executor;
            pool.fetch_all(sql).await.map_err(DbError::from)
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.fetch_all(pool).await.map_err(DbError::from)
        }
    }

    pub async fn fetch_optional_row(
        pool: &MySqlPool,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<Option<MySqlRow>> {
        if params.is_empty() {
            use sqlx::Executor;
            pool.fetch_optional(sql).await.map_err(DbError::from)
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.fetch_optional(pool).await.map_err(DbError::from)
        }
    }

    pub async fn execute(
        pool: &MySqlPool,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<ExecuteResult> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        let result = query.execute(pool).await?;
        let id = result.last_insert_id();
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            inserted_id: (id != 0).then_some(id as i64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::postgres::rewrite_placeholders;

    #[test]
    fn test_rewrite_no_placeholders() {
        assert_eq!(
            rewrite_placeholders("SELECT * FROM projects"),
            "SELECT * FROM projects"
        );
    }

    #[test]
    fn test_rewrite_single_placeholder() {
        assert_eq!(
            rewrite_placeholders("SELECT * FROM projects WHERE id = ?"),
            "SELECT * FROM projects WHERE id = $1"
        );
    }

    #[test]
    fn test_rewrite_five_placeholders() {
        assert_eq!(
            rewrite_placeholders("INSERT INTO tasks (id, projectId, title, status, priority) VALUES (?, ?, ?, ?, ?)"),
            "INSERT INTO tasks (id, projectId, title, status, priority) VALUES ($1, $2, $3, $4, $5)"
        );
    }

    #[test]
    fn test_rewrite_twenty_placeholders() {
        let sql = format!("INSERT INTO t VALUES ({})", vec!["?"; 20].join(", "));
        let expected = format!(
            "INSERT INTO t VALUES ({})",
            (1..=20)
                .map(|n| format!("${}", n))
                .collect::<Vec<_>>()
                .join(", ")
        );
        assert_eq!(rewrite_placeholders(&sql), expected);
    }

    #[test]
    fn test_rewrite_skips_string_literals() {
        assert_eq!(
            rewrite_placeholders("SELECT * FROM tasks WHERE title = 'what?' AND id = ?"),
            "SELECT * FROM tasks WHERE title = 'what?' AND id = $1"
        );
    }

    #[test]
    fn test_rewrite_skips_quoted_identifiers() {
        assert_eq!(
            rewrite_placeholders(r#"SELECT "odd?col" FROM t WHERE a = ? AND b = ?"#),
            r#"SELECT "odd?col" FROM t WHERE a = $1 AND b = $2"#
        );
    }
}
