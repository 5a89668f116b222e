//! Idempotent schema convergence.
//!
//! The schema engine runs once during bootstrap. Every operation is safe to
//! re-run and safe under concurrent instances starting at the same time:
//! tables are created `IF NOT EXISTS`, columns are added only when absent,
//! renames only fire when the source exists and the target does not, and
//! any "already exists"/"duplicate column" failure is treated as
//! convergence rather than error.
//!
//! Column introspection differs per engine: the embedded engine reads the
//! table-info pragma, MySQL uses `SHOW COLUMNS ... LIKE`, and Postgres
//! mostly avoids introspection via native `ADD COLUMN IF NOT EXISTS`.

use tracing::{debug, info, warn};

use crate::config::EngineKind;
use crate::db::adapter::Database;
use crate::db::value::SqlValue;
use crate::error::DbResult;

/// Columns introduced after the baseline DDL shipped. Present in the
/// baseline `CREATE TABLE` for fresh databases, added here for fleets
/// created before the column existed.
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("companies", "plan", "VARCHAR(32) DEFAULT 'free'"),
    ("users", "avatar", "TEXT"),
    ("projects", "progress", "INTEGER DEFAULT 0"),
    ("projects", "spent", "REAL DEFAULT 0"),
    ("tasks", "latitude", "REAL"),
    ("tasks", "longitude", "REAL"),
];

/// Column renames performed after launch: (table, old name, new name).
const RENAMED_COLUMNS: &[(&str, &str, &str)] = &[
    ("users", "password", "passwordHash"),
    ("tasks", "assignedTo", "assigneeName"),
];

/// Secondary indexes: (index name, table, column).
const INDEXES: &[(&str, &str, &str)] = &[
    ("idx_users_companyId", "users", "companyId"),
    ("idx_projects_companyId", "projects", "companyId"),
    ("idx_tasks_projectId", "tasks", "projectId"),
    ("idx_tasks_status", "tasks", "status"),
    ("idx_audit_logs_userId", "audit_logs", "userId"),
];

/// Sentinel ids for the guarded seed rows.
pub const SEED_COMPANY_ID: &str = "company-default";
pub const SEED_ADMIN_ID: &str = "user-admin";

/// Role catalog: (id, name, description). Each entry is inserted only when
/// its key is absent.
const ROLE_CATALOG: &[(&str, &str, &str)] = &[
    ("role-admin", "admin", "Full administrative access"),
    ("role-manager", "manager", "Manage projects and tasks"),
    ("role-member", "member", "View and update assigned work"),
];

mod queries {
    pub mod sqlite {
        /// Column names come back in the `name` column of the pragma.
        pub const TABLE_INFO: &str = "PRAGMA table_info(";
    }

    pub mod mysql {
        pub const SHOW_COLUMN: &str = "SHOW COLUMNS FROM ";
    }

    pub mod postgres {
        pub const COLUMN_EXISTS: &str = "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = ? AND column_name = ?";
    }
}

/// Applies the declarative schema to whichever engine the adapter wraps.
pub struct SchemaEngine<'a> {
    db: &'a Database,
}

impl<'a> SchemaEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Bring the schema up to date: baseline tables, post-baseline
    /// columns, renames, indexes, then guarded seed data.
    pub async fn converge(&self) -> DbResult<()> {
        for (table, ddl) in self.baseline_tables() {
            self.run_converging(&ddl, table).await?;
        }
        for (table, column, column_type) in ADDED_COLUMNS {
            self.ensure_column(table, column, column_type).await?;
        }
        for (table, from, to) in RENAMED_COLUMNS {
            self.rename_column(table, from, to).await?;
        }
        for (name, table, column) in INDEXES {
            self.ensure_index(name, table, column).await?;
        }
        self.seed().await?;
        info!(engine = %self.db.engine_kind(), "schema converged");
        Ok(())
    }

    /// Baseline `CREATE TABLE IF NOT EXISTS` DDL, written once per table
    /// with all current columns. Key and indexed columns are VARCHAR so
    /// MySQL can index them; identifiers are quoted only where a reserved
    /// word requires it.
    fn baseline_tables(&self) -> Vec<(&'static str, String)> {
        let ts = self.quote_ident("timestamp");
        vec![
            (
                "companies",
                "CREATE TABLE IF NOT EXISTS companies (
                    id VARCHAR(64) PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    email VARCHAR(255),
                    phone VARCHAR(64),
                    website VARCHAR(255),
                    address TEXT,
                    city VARCHAR(255),
                    state VARCHAR(64),
                    zipCode VARCHAR(32),
                    country VARCHAR(64),
                    plan VARCHAR(32) DEFAULT 'free',
                    status VARCHAR(32) DEFAULT 'active',
                    createdAt TEXT,
                    updatedAt TEXT
                )"
                .to_string(),
            ),
            (
                "users",
                "CREATE TABLE IF NOT EXISTS users (
                    id VARCHAR(64) PRIMARY KEY,
                    companyId VARCHAR(64),
                    email VARCHAR(255) NOT NULL UNIQUE,
                    name VARCHAR(255) NOT NULL,
                    passwordHash VARCHAR(255),
                    role VARCHAR(32) DEFAULT 'member',
                    phone VARCHAR(64),
                    avatar TEXT,
                    createdAt TEXT,
                    updatedAt TEXT,
                    FOREIGN KEY (companyId) REFERENCES companies(id) ON DELETE CASCADE
                )"
                .to_string(),
            ),
            (
                "projects",
                "CREATE TABLE IF NOT EXISTS projects (
                    id VARCHAR(64) PRIMARY KEY,
                    companyId VARCHAR(64) NOT NULL,
                    name VARCHAR(255) NOT NULL,
                    code VARCHAR(64),
                    description TEXT,
                    status VARCHAR(32) DEFAULT 'planning',
                    budget REAL,
                    spent REAL DEFAULT 0,
                    progress INTEGER DEFAULT 0,
                    startDate TEXT,
                    endDate TEXT,
                    address TEXT,
                    city VARCHAR(255),
                    createdAt TEXT,
                    updatedAt TEXT,
                    FOREIGN KEY (companyId) REFERENCES companies(id) ON DELETE CASCADE
                )"
                .to_string(),
            ),
            (
                "tasks",
                "CREATE TABLE IF NOT EXISTS tasks (
                    id VARCHAR(64) PRIMARY KEY,
                    projectId VARCHAR(64) NOT NULL,
                    title VARCHAR(255) NOT NULL,
                    description TEXT,
                    status VARCHAR(32) DEFAULT 'todo',
                    priority VARCHAR(32) DEFAULT 'medium',
                    assigneeName VARCHAR(255),
                    dueDate TEXT,
                    latitude REAL,
                    longitude REAL,
                    createdAt TEXT,
                    updatedAt TEXT,
                    FOREIGN KEY (projectId) REFERENCES projects(id) ON DELETE CASCADE
                )"
                .to_string(),
            ),
            (
                "roles",
                "CREATE TABLE IF NOT EXISTS roles (
                    id VARCHAR(64) PRIMARY KEY,
                    name VARCHAR(64) NOT NULL UNIQUE,
                    description TEXT
                )"
                .to_string(),
            ),
            (
                "audit_logs",
                format!(
                    "CREATE TABLE IF NOT EXISTS audit_logs (
                    id VARCHAR(64) PRIMARY KEY,
                    userId VARCHAR(64),
                    action VARCHAR(64) NOT NULL,
                    resource VARCHAR(64),
                    resourceId VARCHAR(64),
                    details TEXT,
                    {ts} TEXT,
                    FOREIGN KEY (userId) REFERENCES users(id) ON DELETE SET NULL
                )"
                ),
            ),
        ]
    }

    /// Add a column unless the table already has it.
    pub async fn ensure_column(
        &self,
        table: &str,
        column: &str,
        column_type: &str,
    ) -> DbResult<()> {
        let object = format!("{}.{}", table, column);
        match self.db.engine_kind() {
            // Native, no introspection needed
            EngineKind::Postgres => {
                let sql = format!(
                    "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
                    table, column, column_type
                );
                self.run_converging(&sql, &object).await
            }
            _ => {
                if self.column_exists(table, column).await? {
                    debug!(object = %object, "column already present");
                    return Ok(());
                }
                let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_type);
                self.run_converging(&sql, &object).await
            }
        }
    }

    /// Rename a column when the source exists and the target does not.
    /// Anything else is a no-op: a previous deployment already renamed it,
    /// or the table never had the old column.
    pub async fn rename_column(&self, table: &str, from: &str, to: &str) -> DbResult<()> {
        if !self.column_exists(table, from).await? {
            debug!(table = %table, from = %from, "rename source absent, nothing to do");
            return Ok(());
        }
        if self.column_exists(table, to).await? {
            debug!(table = %table, to = %to, "rename target already present, nothing to do");
            return Ok(());
        }
        let sql = format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, from, to);
        self.run_converging(&sql, &format!("{}.{}", table, from)).await
    }

    /// Create a secondary index unless it exists. MySQL has no
    /// `IF NOT EXISTS` for indexes, so its duplicate-key error is
    /// swallowed as convergence instead.
    pub async fn ensure_index(&self, name: &str, table: &str, column: &str) -> DbResult<()> {
        let sql = match self.db.engine_kind() {
            EngineKind::MySql => format!("CREATE INDEX {} ON {} ({})", name, table, column),
            _ => format!("CREATE INDEX IF NOT EXISTS {} ON {} ({})", name, table, column),
        };
        self.run_converging(&sql, name).await
    }

    /// Does `table` currently have `column`?
    pub async fn column_exists(&self, table: &str, column: &str) -> DbResult<bool> {
        match self.db.engine_kind() {
            EngineKind::Sqlite => {
                let sql = format!("{}{})", queries::sqlite::TABLE_INFO, table);
                let rows = self.db.fetch_all(&sql, &[]).await?;
                Ok(rows.iter().any(|row| row.get_str("name") == Some(column)))
            }
            EngineKind::MySql => {
                let sql = format!("{}{} LIKE ?", queries::mysql::SHOW_COLUMN, table);
                let row = self
                    .db
                    .fetch_one(&sql, &[SqlValue::from(column)])
                    .await?;
                Ok(row.is_some())
            }
            EngineKind::Postgres => {
                let row = self
                    .db
                    .fetch_one(
                        queries::postgres::COLUMN_EXISTS,
                        &[SqlValue::from(table), SqlValue::from(column)],
                    )
                    .await?;
                Ok(row.is_some())
            }
        }
    }

    /// One-time data seeding, always guarded by an existence check so
    /// repeated bootstraps converge instead of duplicating rows. The
    /// default company and admin only go into an empty database.
    ///
    /// The existence checks race under concurrent bootstrap: two
    /// instances can both observe an empty table, and only one insert
    /// wins. The loser's duplicate-key error is convergence, not
    /// failure, so every seed insert goes through [`Self::seed_insert`].
    async fn seed(&self) -> DbResult<()> {
        let now = chrono::Utc::now().to_rfc3339();

        let existing = self
            .db
            .fetch_one("SELECT id FROM companies LIMIT 1", &[])
            .await?;
        if existing.is_none() {
            self.seed_insert(
                "INSERT INTO companies (id, name, status, createdAt, updatedAt) \
                 VALUES (?, ?, 'active', ?, ?)",
                &[
                    SqlValue::from(SEED_COMPANY_ID),
                    SqlValue::from("Default Company"),
                    SqlValue::from(now.as_str()),
                    SqlValue::from(now.as_str()),
                ],
                SEED_COMPANY_ID,
            )
            .await?;
            self.seed_insert(
                "INSERT INTO users (id, companyId, email, name, role, createdAt, updatedAt) \
                 VALUES (?, ?, ?, ?, 'admin', ?, ?)",
                &[
                    SqlValue::from(SEED_ADMIN_ID),
                    SqlValue::from(SEED_COMPANY_ID),
                    SqlValue::from("admin@example.com"),
                    SqlValue::from("Administrator"),
                    SqlValue::from(now.as_str()),
                    SqlValue::from(now.as_str()),
                ],
                SEED_ADMIN_ID,
            )
            .await?;
            info!("seeded default company and admin user");
        }

        for (id, name, description) in ROLE_CATALOG {
            let present = self
                .db
                .fetch_one("SELECT id FROM roles WHERE id = ?", &[SqlValue::from(*id)])
                .await?;
            if present.is_none() {
                self.seed_insert(
                    "INSERT INTO roles (id, name, description) VALUES (?, ?, ?)",
                    &[
                        SqlValue::from(*id),
                        SqlValue::from(*name),
                        SqlValue::from(*description),
                    ],
                    id,
                )
                .await?;
                debug!(role = %name, "seeded role");
            }
        }
        Ok(())
    }

    /// Insert one seed row, tolerating a concurrent bootstrap having
    /// inserted it first.
    async fn seed_insert(&self, sql: &str, params: &[SqlValue], object: &str) -> DbResult<()> {
        match self.db.execute(sql, params).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_unique_violation() => {
                debug!(object = %object, "seed row already present");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Run one DDL statement, treating "already applied" failures as
    /// success. Everything else propagates with its diagnostics intact.
    async fn run_converging(&self, sql: &str, object: &str) -> DbResult<()> {
        match self.db.execute_raw(sql).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_convergence() => {
                debug!(object = %object, error = %err, "schema operation already applied");
                Ok(())
            }
            Err(err) => {
                warn!(object = %object, error = %err, "schema operation failed");
                Err(err)
            }
        }
    }

    fn quote_ident(&self, ident: &str) -> String {
        match self.db.engine_kind() {
            EngineKind::MySql => format!("`{}`", ident),
            _ => format!("\"{}\"", ident),
        }
    }
}
