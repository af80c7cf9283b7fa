//! Artifact and installer rows.
//!
//! Lifecycle is derived from nullability, never a status column:
//!   pending   — storage_key set, download_url null (upload reserved)
//!   confirmed — download_url set (visible to the update resolver)
//!   direct    — download_url set, storage_key null (externally hosted)
//!
//! The `(release_id, platform)` uniqueness constraint serialises concurrent
//! presigns for the same slot: one inserts, the other maps to `conflict`.

use sqlx::SqlitePool;

use crate::error::{is_unique_violation, ApiError};
use crate::ids::{new_id, now_ms};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArtifactRow {
    pub id: String,
    pub release_id: String,
    pub platform: String,
    pub signature: Option<String>,
    pub storage_key: Option<String>,
    pub download_url: Option<String>,
    pub file_size: Option<i64>,
    pub checksum: Option<String>,
    pub created_at: i64,
}

impl ArtifactRow {
    /// Upload reserved but never confirmed. Not served to clients.
    pub fn is_pending(&self) -> bool {
        self.storage_key.is_some() && self.download_url.is_none()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InstallerRow {
    pub id: String,
    pub release_id: String,
    pub platform: String,
    pub filename: String,
    pub display_name: Option<String>,
    pub storage_key: Option<String>,
    pub download_url: Option<String>,
    pub file_size: Option<i64>,
    pub checksum: Option<String>,
    pub created_at: i64,
}

impl InstallerRow {
    pub fn is_pending(&self) -> bool {
        self.storage_key.is_some() && self.download_url.is_none()
    }
}

fn slot_conflict(platform: &str) -> ApiError {
    ApiError::conflict(format!(
        "platform '{platform}' already has an entry for this release"
    ))
}

// ─── ArtifactStore ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ArtifactStore {
    pool: SqlitePool,
}

impl ArtifactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Phase 1 of the upload protocol: reserve the `(release, platform)` slot.
    pub async fn insert_pending(
        &self,
        release_id: &str,
        platform: &str,
        storage_key: &str,
    ) -> Result<ArtifactRow, ApiError> {
        let id = new_id();
        let res = sqlx::query(
            "INSERT INTO artifacts (id, release_id, platform, storage_key, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(release_id)
        .bind(platform)
        .bind(storage_key)
        .bind(now_ms())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => self.require(&id).await,
            Err(e) if is_unique_violation(&e) => Err(slot_conflict(platform)),
            Err(e) => Err(e.into()),
        }
    }

    /// Externally-hosted artifact: download URL known up front, no storage key.
    pub async fn insert_direct(
        &self,
        release_id: &str,
        platform: &str,
        download_url: &str,
        signature: Option<&str>,
        file_size: Option<i64>,
        checksum: Option<&str>,
    ) -> Result<ArtifactRow, ApiError> {
        let id = new_id();
        let res = sqlx::query(
            "INSERT INTO artifacts
               (id, release_id, platform, download_url, signature, file_size, checksum, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(release_id)
        .bind(platform)
        .bind(download_url)
        .bind(signature)
        .bind(file_size)
        .bind(checksum)
        .bind(now_ms())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => self.require(&id).await,
            Err(e) if is_unique_violation(&e) => Err(slot_conflict(platform)),
            Err(e) => Err(e.into()),
        }
    }

    /// CI path: object already uploaded, row lands confirmed in one step.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_confirmed(
        &self,
        release_id: &str,
        platform: &str,
        storage_key: &str,
        download_url: &str,
        signature: Option<&str>,
        file_size: Option<i64>,
        checksum: Option<&str>,
    ) -> Result<ArtifactRow, ApiError> {
        let id = new_id();
        let res = sqlx::query(
            "INSERT INTO artifacts
               (id, release_id, platform, storage_key, download_url, signature, file_size, checksum, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(release_id)
        .bind(platform)
        .bind(storage_key)
        .bind(download_url)
        .bind(signature)
        .bind(file_size)
        .bind(checksum)
        .bind(now_ms())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => self.require(&id).await,
            Err(e) if is_unique_violation(&e) => Err(slot_conflict(platform)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ArtifactRow>, ApiError> {
        let row = sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn require(&self, id: &str) -> Result<ArtifactRow, ApiError> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("artifact '{id}'")))
    }

    pub async fn require_in_release(
        &self,
        release_id: &str,
        id: &str,
    ) -> Result<ArtifactRow, ApiError> {
        let row = self.require(id).await?;
        if row.release_id != release_id {
            return Err(ApiError::not_found(format!("artifact '{id}'")));
        }
        Ok(row)
    }

    pub async fn get_by_platform(
        &self,
        release_id: &str,
        platform: &str,
    ) -> Result<Option<ArtifactRow>, ApiError> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            "SELECT * FROM artifacts WHERE release_id = ? AND platform = ?",
        )
        .bind(release_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list(&self, release_id: &str) -> Result<Vec<ArtifactRow>, ApiError> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT * FROM artifacts WHERE release_id = ? ORDER BY platform",
        )
        .bind(release_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Phase 2 write-through. Guarded on the pending state so a double
    /// confirm (or a confirm racing a delete) maps to `not_pending`.
    pub async fn confirm(
        &self,
        id: &str,
        download_url: &str,
        file_size: i64,
        signature: Option<&str>,
        checksum: Option<&str>,
    ) -> Result<ArtifactRow, ApiError> {
        let changed = sqlx::query(
            "UPDATE artifacts
             SET download_url = ?, file_size = ?,
                 signature = COALESCE(?, signature),
                 checksum = COALESCE(?, checksum)
             WHERE id = ? AND storage_key IS NOT NULL AND download_url IS NULL",
        )
        .bind(download_url)
        .bind(file_size)
        .bind(signature)
        .bind(checksum)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if changed == 0 {
            return Err(ApiError::NotPending);
        }
        self.require(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM artifacts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ─── InstallerStore ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct InstallerStore {
    pool: SqlitePool,
}

impl InstallerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_pending(
        &self,
        release_id: &str,
        platform: &str,
        filename: &str,
        display_name: Option<&str>,
        storage_key: &str,
    ) -> Result<InstallerRow, ApiError> {
        let id = new_id();
        let res = sqlx::query(
            "INSERT INTO installers (id, release_id, platform, filename, display_name, storage_key, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(release_id)
        .bind(platform)
        .bind(filename)
        .bind(display_name)
        .bind(storage_key)
        .bind(now_ms())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => self.require(&id).await,
            Err(e) if is_unique_violation(&e) => Err(slot_conflict(platform)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn insert_direct(
        &self,
        release_id: &str,
        platform: &str,
        filename: &str,
        display_name: Option<&str>,
        download_url: &str,
        file_size: Option<i64>,
    ) -> Result<InstallerRow, ApiError> {
        let id = new_id();
        let res = sqlx::query(
            "INSERT INTO installers
               (id, release_id, platform, filename, display_name, download_url, file_size, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(release_id)
        .bind(platform)
        .bind(filename)
        .bind(display_name)
        .bind(download_url)
        .bind(file_size)
        .bind(now_ms())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => self.require(&id).await,
            Err(e) if is_unique_violation(&e) => Err(slot_conflict(platform)),
            Err(e) => Err(e.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_confirmed(
        &self,
        release_id: &str,
        platform: &str,
        filename: &str,
        display_name: Option<&str>,
        storage_key: &str,
        download_url: &str,
        file_size: Option<i64>,
    ) -> Result<InstallerRow, ApiError> {
        let id = new_id();
        let res = sqlx::query(
            "INSERT INTO installers
               (id, release_id, platform, filename, display_name, storage_key, download_url, file_size, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(release_id)
        .bind(platform)
        .bind(filename)
        .bind(display_name)
        .bind(storage_key)
        .bind(download_url)
        .bind(file_size)
        .bind(now_ms())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => self.require(&id).await,
            Err(e) if is_unique_violation(&e) => Err(slot_conflict(platform)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<InstallerRow>, ApiError> {
        let row = sqlx::query_as::<_, InstallerRow>("SELECT * FROM installers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn require(&self, id: &str) -> Result<InstallerRow, ApiError> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("installer '{id}'")))
    }

    pub async fn require_in_release(
        &self,
        release_id: &str,
        id: &str,
    ) -> Result<InstallerRow, ApiError> {
        let row = self.require(id).await?;
        if row.release_id != release_id {
            return Err(ApiError::not_found(format!("installer '{id}'")));
        }
        Ok(row)
    }

    pub async fn get_by_platform(
        &self,
        release_id: &str,
        platform: &str,
    ) -> Result<Option<InstallerRow>, ApiError> {
        let row = sqlx::query_as::<_, InstallerRow>(
            "SELECT * FROM installers WHERE release_id = ? AND platform = ?",
        )
        .bind(release_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list(&self, release_id: &str) -> Result<Vec<InstallerRow>, ApiError> {
        let rows = sqlx::query_as::<_, InstallerRow>(
            "SELECT * FROM installers WHERE release_id = ? ORDER BY platform",
        )
        .bind(release_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn confirm(
        &self,
        id: &str,
        download_url: &str,
        file_size: i64,
        checksum: Option<&str>,
    ) -> Result<InstallerRow, ApiError> {
        let changed = sqlx::query(
            "UPDATE installers
             SET download_url = ?, file_size = ?, checksum = COALESCE(?, checksum)
             WHERE id = ? AND storage_key IS NOT NULL AND download_url IS NULL",
        )
        .bind(download_url)
        .bind(file_size)
        .bind(checksum)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if changed == 0 {
            return Err(ApiError::NotPending);
        }
        self.require(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM installers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
