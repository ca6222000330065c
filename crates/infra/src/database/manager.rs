//! Connection pool manager
//!
//! Owns the r2d2 pool over SQLite and applies schema migrations on
//! startup. All repository access goes through [`DatabaseManager::pool`];
//! blocking rusqlite work is wrapped in `spawn_blocking` by the
//! repositories themselves.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use taxbridge_domain::{Result, TaxBridgeError};
use tracing::info;

use crate::errors::InfraError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS request_log (
    id TEXT PRIMARY KEY,
    service TEXT NOT NULL,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    request_data TEXT,
    status TEXT NOT NULL,
    output TEXT,
    error TEXT,
    description TEXT,
    reference_doctype TEXT,
    reference_name TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_request_log_reference
    ON request_log (reference_doctype, reference_name);
CREATE INDEX IF NOT EXISTS idx_request_log_status
    ON request_log (status);
"#;

/// Pool owner and migration runner.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: Pool<SqliteConnectionManager>,
}

impl DatabaseManager {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// # Errors
    /// Returns `TaxBridgeError::Database` when the pool cannot be built or
    /// the schema cannot be applied.
    pub fn new(path: &Path, pool_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|err| TaxBridgeError::from(InfraError::from(err)))?;

        let database = Self { pool };
        database.migrate()?;
        info!(path = %path.display(), pool_size, "database ready");
        Ok(database)
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> Pool<SqliteConnectionManager> {
        self.pool.clone()
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.pool.get().map_err(|err| TaxBridgeError::from(InfraError::from(err)))?;
        conn.execute_batch(SCHEMA)
            .map_err(|err| TaxBridgeError::from(InfraError::from(err)))?;
        Ok(())
    }
}
