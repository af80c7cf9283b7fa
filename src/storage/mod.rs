//! SQLite persistence.
//!
//! One WAL-mode pool shared by every store. Migrations are embedded `.sql`
//! files executed statement-by-statement at startup. Foreign keys are
//! enforced so App → Release → Artifact cascades happen in the database.

pub mod apps;
pub mod artifacts;
pub mod crashes;
pub mod feedback;
pub mod keys;
pub mod releases;

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("oasis.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .foreign_keys(true)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Liveness probe used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        for sql in [
            include_str!("migrations/001_init.sql"),
            include_str!("migrations/002_telemetry.sql"),
        ] {
            for stmt in sql.split(';') {
                let stmt = stmt.trim();
                if !stmt.is_empty() {
                    sqlx::query(stmt).execute(pool).await?;
                }
            }
        }
        Ok(())
    }
}

/// Clamped `(limit, offset)` pair for list queries.
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>, default: i64, max: i64) -> (i64, i64) {
    let limit = limit.unwrap_or(default).clamp(1, max);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}
