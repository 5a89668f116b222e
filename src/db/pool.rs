//! Connection pool construction and lifecycle.
//!
//! One [`DbPool`] wraps exactly one engine-native pool. The embedded engine
//! is capped at a single connection; the client-server engines get tuned
//! pools from [`PoolOptions`](crate::config::PoolOptions).

use std::str::FromStr;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{MySqlPool, PgPool, SqlitePool};
use tracing::info;

use crate::config::{DbConfig, EngineKind, SqliteTarget, masked_connection_string};
use crate::error::DbResult;

/// A connection pool for one of the supported engines.
#[derive(Debug, Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl DbPool {
    /// Connect to whichever engine the configuration selects.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        config.pool.validate()?;
        match config.select_engine() {
            EngineKind::Sqlite => Self::connect_sqlite(config).await,
            EngineKind::Postgres => Self::connect_postgres(config).await,
            EngineKind::MySql => Self::connect_mysql(config).await,
        }
    }

    async fn connect_sqlite(config: &DbConfig) -> DbResult<Self> {
        let target = config.sqlite_target();
        let options = match &target {
            SqliteTarget::Memory => SqliteConnectOptions::from_str("sqlite::memory:")?,
            SqliteTarget::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
        }
        .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.pool.max_connections_or_default(true));
        if target == SqliteTarget::Memory {
            // An in-memory database lives and dies with its connection;
            // never let the pool reclaim it.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        match &target {
            SqliteTarget::Memory => {
                info!(engine = %EngineKind::Sqlite, "connected to in-memory database")
            }
            SqliteTarget::File(path) => {
                info!(engine = %EngineKind::Sqlite, path = %path.display(), "connected")
            }
        }
        Ok(Self::Sqlite(pool))
    }

    async fn connect_postgres(config: &DbConfig) -> DbResult<Self> {
        let url = config.postgres_url()?;
        let options = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .min_connections(config.pool.min_connections_or_default())
            .max_connections(config.pool.max_connections_or_default(false))
            .acquire_timeout(Duration::from_secs(config.pool.acquire_timeout_or_default()))
            .idle_timeout(Duration::from_secs(config.pool.idle_timeout_or_default()))
            .test_before_acquire(config.pool.test_before_acquire_or_default())
            .connect_with(options)
            .await?;

        info!(
            engine = %EngineKind::Postgres,
            url = %masked_connection_string(url),
            max_connections = config.pool.max_connections_or_default(false),
            "connected"
        );
        Ok(Self::Postgres(pool))
    }

    async fn connect_mysql(config: &DbConfig) -> DbResult<Self> {
        let settings = config.mysql_settings()?;
        let mut options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .database(&settings.database)
            .charset("utf8mb4");
        if !settings.password.is_empty() {
            options = options.password(&settings.password);
        }
        let pool = MySqlPoolOptions::new()
            .min_connections(config.pool.min_connections_or_default())
            .max_connections(config.pool.max_connections_or_default(false))
            .acquire_timeout(Duration::from_secs(config.pool.acquire_timeout_or_default()))
            .idle_timeout(Duration::from_secs(config.pool.idle_timeout_or_default()))
            .test_before_acquire(config.pool.test_before_acquire_or_default())
            .connect_with(options)
            .await?;

        info!(
            engine = %EngineKind::MySql,
            host = %settings.host,
            port = settings.port,
            database = %settings.database,
            max_connections = config.pool.max_connections_or_default(false),
            "connected"
        );
        Ok(Self::MySql(pool))
    }

    /// Which engine this pool talks to.
    pub fn engine_kind(&self) -> EngineKind {
        match self {
            Self::Sqlite(_) => EngineKind::Sqlite,
            Self::Postgres(_) => EngineKind::Postgres,
            Self::MySql(_) => EngineKind::MySql,
        }
    }

    /// Close the pool. Safe to call more than once.
    pub async fn close(&self) {
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Sqlite(pool) => pool.is_closed(),
            Self::Postgres(pool) => pool.is_closed(),
            Self::MySql(pool) => pool.is_closed(),
        }
    }
}
