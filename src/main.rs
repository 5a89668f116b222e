//! cortexdb CLI - bootstrap the configured database and report its state.
//!
//! Connects to whichever engine the environment selects, converges the
//! schema, then prints the engine kind and per-table column counts. Meant
//! for operators checking a fleet member's database before rollout.

use std::path::PathBuf;

use clap::Parser;
use cortexdb::config::{DbConfig, EngineKind, PoolOptions, RunMode, masked_connection_string};
use cortexdb::db::Bootstrap;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "cortexdb", version, about)]
struct Cli {
    /// Force the embedded engine regardless of other settings
    #[arg(long, env = "USE_LOCAL_DB")]
    use_local: bool,

    /// Explicit engine selector
    #[arg(long, env = "DB_TYPE", value_enum)]
    db_type: Option<EngineKind>,

    /// Full DSN for the pooled engines
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "DB_HOST")]
    db_host: Option<String>,
    #[arg(long, env = "DB_PORT")]
    db_port: Option<u16>,
    #[arg(long, env = "DB_USER")]
    db_user: Option<String>,
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,
    #[arg(long, env = "DB_NAME")]
    db_name: Option<String>,

    /// Runtime mode; test mode uses an in-memory embedded database
    #[arg(long, env = "APP_ENV", value_enum, default_value = "production")]
    mode: RunMode,

    /// Embedded-engine file path override
    #[arg(long, env = "SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn into_config(self) -> DbConfig {
        DbConfig {
            use_local: self.use_local,
            engine: self.db_type,
            database_url: self.database_url,
            db_host: self.db_host,
            db_port: self.db_port,
            db_user: self.db_user,
            db_password: self.db_password,
            db_name: self.db_name,
            run_mode: self.mode,
            sqlite_path: self.sqlite_path,
            pool: PoolOptions::default(),
        }
    }
}

/// Initialize the tracing subscriber for logging.
fn init_tracing(log_level: &str, json_logs: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);
    let config = cli.into_config();

    if let Some(url) = &config.database_url {
        info!(url = %masked_connection_string(url), "configured connection string");
    }

    let bootstrap = Bootstrap::new();
    let db = match bootstrap.init(&config).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "bootstrap failed");
            return Err(e.into());
        }
    };

    info!(engine = %db.engine_kind(), "database ready");

    for table in ["companies", "users", "projects", "tasks", "roles", "audit_logs"] {
        let count = db
            .fetch_one(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
            .await?
            .and_then(|row| row.get_i64("n"))
            .unwrap_or(0);
        info!(table = %table, rows = count, "table ready");
    }

    db.close().await;
    info!("shutdown complete");
    Ok(())
}
