//! One-time database bootstrap.
//!
//! [`Bootstrap`] owns the process-wide [`Database`] singleton. It is an
//! explicit container passed to callers, not an ambient global, so tests
//! can construct a fresh one per run. Concurrent first-time callers all
//! await the same in-flight initialization; once ready, `init` is a pure
//! cache hit.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::config::DbConfig;
use crate::db::adapter::Database;
use crate::db::schema::SchemaEngine;
use crate::error::{DbError, DbResult};

#[derive(Debug, Default)]
pub struct Bootstrap {
    cell: OnceCell<Arc<Database>>,
}

impl Bootstrap {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Construct, schema-initialize and cache the adapter. Safe to call
    /// repeatedly and from any number of concurrent callers; exactly one
    /// initialization sequence runs.
    pub async fn init(&self, config: &DbConfig) -> DbResult<Arc<Database>> {
        let db = self
            .cell
            .get_or_try_init(|| async {
                info!(engine = %config.select_engine(), "initializing database");
                let db = Database::connect(config).await?;
                SchemaEngine::new(&db).converge().await?;
                info!(engine = %db.engine_kind(), "database ready");
                Ok::<_, DbError>(Arc::new(db))
            })
            .await?;
        Ok(Arc::clone(db))
    }

    /// The ready adapter. Fails with [`DbError::NotInitialized`] before
    /// [`Bootstrap::init`] has completed.
    pub fn get(&self) -> DbResult<Arc<Database>> {
        self.cell.get().cloned().ok_or(DbError::NotInitialized)
    }
}
