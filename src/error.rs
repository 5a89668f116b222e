//! Error types for the data-access layer.
//!
//! This module defines all error types using `thiserror`. The taxonomy
//! separates errors by how callers must react: configuration problems abort
//! bootstrap, transient backend faults may be retried, query faults surface
//! immediately, and migration conflicts signal convergence rather than
//! failure.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Transient backend error: {message}")]
    Transient { message: String },

    #[error("Query error: {message}")]
    Query {
        message: String,
        /// e.g., "42701" for a duplicate column
        sql_state: Option<String>,
    },

    #[error("Migration conflict on {object}: {message}")]
    MigrationConflict { message: String, object: String },

    #[error("Database handle is closed")]
    Closed,

    #[error("Database has not been initialized; run bootstrap first")]
    NotInitialized,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transient backend error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a migration conflict error.
    pub fn migration_conflict(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::MigrationConflict {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Engine-native SQL state, when the backend reported one.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check whether retrying this error could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Check whether this error means a schema operation was already
    /// applied by a previous or concurrent bootstrap run.
    ///
    /// Covers duplicate column (Postgres SQLSTATE 42701, MySQL 42S21),
    /// duplicate table (Postgres 42P07, MySQL 42S01), an ALTER target
    /// that is already gone ("does not exist"), and the message patterns
    /// the drivers report without a usable state code (SQLite has none;
    /// MySQL's duplicate key name maps to the generic 42000, so only its
    /// message identifies it).
    pub fn is_convergence(&self) -> bool {
        match self {
            Self::MigrationConflict { .. } => true,
            Self::Query { message, sql_state } => {
                if let Some(state) = sql_state {
                    if matches!(state.as_str(), "42701" | "42P07" | "42S21" | "42S01") {
                        return true;
                    }
                }
                let lower = message.to_lowercase();
                lower.contains("duplicate column")
                    || lower.contains("already exists")
                    || lower.contains("duplicate key name")
                    || lower.contains("does not exist")
            }
            _ => false,
        }
    }

    /// Check whether the backend rejected a write for violating a unique
    /// or primary key constraint.
    ///
    /// Postgres reports SQLSTATE 23505 and MySQL 23000; SQLite reports
    /// its numeric extended result codes (1555 for a primary key, 2067
    /// for a unique index). The message patterns cover all three drivers
    /// as a fallback.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Query { message, sql_state } => {
                if let Some(state) = sql_state {
                    if matches!(state.as_str(), "23505" | "23000" | "1555" | "2067") {
                        return true;
                    }
                }
                let lower = message.to_lowercase();
                lower.contains("unique constraint") || lower.contains("duplicate entry")
            }
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::query("No rows returned", None),
            sqlx::Error::PoolTimedOut => {
                DbError::transient("Timed out acquiring a connection from the pool")
            }
            sqlx::Error::PoolClosed => DbError::Closed,
            sqlx::Error::Io(io_err) => DbError::transient(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => {
                DbError::configuration(format!("TLS error: {}", tls_err))
            }
            sqlx::Error::Protocol(msg) => DbError::transient(format!("Protocol error: {}", msg)),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::query(format!("Column not found: {}", col), None)
            }
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::query(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
