//! Release catalog — draft → published → archived.
//!
//! State transitions are guarded by optimistic `WHERE (id, status)` clauses:
//! two concurrent publishes race cleanly, with exactly one observing the
//! draft row and the other mapped to `conflict`.

use sqlx::SqlitePool;

use crate::error::{is_unique_violation, ApiError};
use crate::ids::{new_id, now_ms};

pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_PUBLISHED: &str = "published";
pub const STATUS_ARCHIVED: &str = "archived";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReleaseRow {
    pub id: String,
    pub app_id: String,
    pub version: String,
    pub notes: Option<String>,
    pub status: String,
    /// Set the first time the release enters `published`; survives archive.
    pub pub_date: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone)]
pub struct ReleaseStore {
    pool: SqlitePool,
}

impl ReleaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        app_id: &str,
        version: &str,
        notes: Option<&str>,
    ) -> Result<ReleaseRow, ApiError> {
        let now = now_ms();
        let id = new_id();
        let res = sqlx::query(
            "INSERT INTO releases (id, app_id, version, notes, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'draft', ?, ?)",
        )
        .bind(&id)
        .bind(app_id)
        .bind(version)
        .bind(notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(ApiError::conflict(format!(
                    "release {version} already exists for this app"
                )));
            }
            Err(e) => return Err(e.into()),
        }
        self.require(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<ReleaseRow>, ApiError> {
        let row = sqlx::query_as::<_, ReleaseRow>("SELECT * FROM releases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn require(&self, id: &str) -> Result<ReleaseRow, ApiError> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("release '{id}'")))
    }

    /// Load a release and verify it belongs to `app_id`. A release reached
    /// through another app's URL is a 404, not a 403 — the path simply does
    /// not name a resource.
    pub async fn require_in_app(&self, app_id: &str, id: &str) -> Result<ReleaseRow, ApiError> {
        let row = self.require(id).await?;
        if row.app_id != app_id {
            return Err(ApiError::not_found(format!("release '{id}'")));
        }
        Ok(row)
    }

    pub async fn get_by_version(
        &self,
        app_id: &str,
        version: &str,
    ) -> Result<Option<ReleaseRow>, ApiError> {
        let row = sqlx::query_as::<_, ReleaseRow>(
            "SELECT * FROM releases WHERE app_id = ? AND version = ?",
        )
        .bind(app_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list(
        &self,
        app_id: &str,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ReleaseRow>, i64), ApiError> {
        let (total, rows) = match status {
            Some(status) => {
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM releases WHERE app_id = ? AND status = ?",
                )
                .bind(app_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
                let rows = sqlx::query_as::<_, ReleaseRow>(
                    "SELECT * FROM releases WHERE app_id = ? AND status = ?
                     ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                )
                .bind(app_id)
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
            None => {
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM releases WHERE app_id = ?")
                        .bind(app_id)
                        .fetch_one(&self.pool)
                        .await?;
                let rows = sqlx::query_as::<_, ReleaseRow>(
                    "SELECT * FROM releases WHERE app_id = ?
                     ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                )
                .bind(app_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
        };
        Ok((rows, total))
    }

    /// All published releases of an app — the update resolver's input set.
    pub async fn list_published(&self, app_id: &str) -> Result<Vec<ReleaseRow>, ApiError> {
        let rows = sqlx::query_as::<_, ReleaseRow>(
            "SELECT * FROM releases WHERE app_id = ? AND status = 'published'",
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Notes are editable in any state; status only moves through
    /// publish/archive/delete.
    pub async fn update_notes(&self, id: &str, notes: Option<&str>) -> Result<ReleaseRow, ApiError> {
        self.require(id).await?;
        sqlx::query("UPDATE releases SET notes = ?, updated_at = ? WHERE id = ?")
            .bind(notes)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.require(id).await
    }

    /// draft → published. Sets `pub_date` on first publish.
    pub async fn publish(&self, id: &str) -> Result<ReleaseRow, ApiError> {
        let now = now_ms();
        let changed = sqlx::query(
            "UPDATE releases SET status = 'published', pub_date = ?, updated_at = ?
             WHERE id = ? AND status = 'draft'",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if changed == 0 {
            let row = self.require(id).await?;
            return Err(ApiError::conflict(format!(
                "release {} is {} and cannot be published",
                row.version, row.status
            )));
        }
        self.require(id).await
    }

    /// draft | published → archived. `pub_date` is preserved.
    pub async fn archive(&self, id: &str) -> Result<ReleaseRow, ApiError> {
        let changed = sqlx::query(
            "UPDATE releases SET status = 'archived', updated_at = ?
             WHERE id = ? AND status IN ('draft', 'published')",
        )
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if changed == 0 {
            let row = self.require(id).await?;
            return Err(ApiError::conflict(format!(
                "release {} is already {}",
                row.version, row.status
            )));
        }
        self.require(id).await
    }

    /// Only drafts may be deleted.
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let changed = sqlx::query("DELETE FROM releases WHERE id = ? AND status = 'draft'")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if changed == 0 {
            let row = self.require(id).await?;
            return Err(ApiError::conflict(format!(
                "release {} is {} and cannot be deleted",
                row.version, row.status
            )));
        }
        Ok(())
    }
}
