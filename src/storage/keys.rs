//! Credential rows: admin/CI bearer keys and per-app SDK public keys.
//!
//! Only SHA-256 hashes are persisted. Revocation is a soft mark so audit
//! history survives; authentication filters on `revoked_at IS NULL`.

use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::ids::{new_id, now_ms};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKeyRow {
    pub id: String,
    pub name: String,
    pub key_hash: String,
    /// "admin" (global) or "ci" (bound to one app).
    pub scope: String,
    pub app_id: Option<String>,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
    pub revoked_at: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PublicApiKeyRow {
    pub id: String,
    pub app_id: String,
    pub name: String,
    pub key_hash: String,
    /// First ~24 plaintext chars, kept for dashboard display only.
    pub key_prefix: String,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
    pub revoked_at: Option<i64>,
}

#[derive(Clone)]
pub struct KeyStore {
    pool: SqlitePool,
}

impl KeyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ─── Admin / CI keys ─────────────────────────────────────────────────────

    pub async fn insert_api_key(
        &self,
        name: &str,
        key_hash: &str,
        scope: &str,
        app_id: Option<&str>,
    ) -> Result<ApiKeyRow, ApiError> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO api_keys (id, name, key_hash, scope, app_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(key_hash)
        .bind(scope)
        .bind(app_id)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        self.require_api_key(&id).await
    }

    pub async fn require_api_key(&self, id: &str) -> Result<ApiKeyRow, ApiError> {
        sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("API key '{id}'")))
    }

    /// Active-key lookup used by bearer authentication.
    pub async fn find_api_key_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<ApiKeyRow>, ApiError> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT * FROM api_keys WHERE key_hash = ? AND revoked_at IS NULL",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKeyRow>, ApiError> {
        let rows =
            sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn revoke_api_key(&self, id: &str) -> Result<(), ApiError> {
        let row = self.require_api_key(id).await?;
        if row.revoked_at.is_some() {
            return Err(ApiError::conflict(format!("API key '{id}' is already revoked")));
        }
        sqlx::query("UPDATE api_keys SET revoked_at = ? WHERE id = ?")
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn touch_api_key(&self, id: &str) -> Result<(), ApiError> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─── SDK public keys ─────────────────────────────────────────────────────

    pub async fn insert_public_key(
        &self,
        app_id: &str,
        name: &str,
        key_hash: &str,
        key_prefix: &str,
    ) -> Result<PublicApiKeyRow, ApiError> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO public_api_keys (id, app_id, name, key_hash, key_prefix, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(app_id)
        .bind(name)
        .bind(key_hash)
        .bind(key_prefix)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        self.require_public_key(&id).await
    }

    pub async fn require_public_key(&self, id: &str) -> Result<PublicApiKeyRow, ApiError> {
        sqlx::query_as::<_, PublicApiKeyRow>("SELECT * FROM public_api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("SDK key '{id}'")))
    }

    pub async fn find_public_key_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<PublicApiKeyRow>, ApiError> {
        let row = sqlx::query_as::<_, PublicApiKeyRow>(
            "SELECT * FROM public_api_keys WHERE key_hash = ? AND revoked_at IS NULL",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_public_keys(&self, app_id: &str) -> Result<Vec<PublicApiKeyRow>, ApiError> {
        let rows = sqlx::query_as::<_, PublicApiKeyRow>(
            "SELECT * FROM public_api_keys WHERE app_id = ? ORDER BY created_at DESC",
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn revoke_public_key(&self, app_id: &str, id: &str) -> Result<(), ApiError> {
        let row = self.require_public_key(id).await?;
        if row.app_id != app_id {
            return Err(ApiError::not_found(format!("SDK key '{id}'")));
        }
        if row.revoked_at.is_some() {
            return Err(ApiError::conflict(format!("SDK key '{id}' is already revoked")));
        }
        sqlx::query("UPDATE public_api_keys SET revoked_at = ? WHERE id = ?")
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn touch_public_key(&self, id: &str) -> Result<(), ApiError> {
        sqlx::query("UPDATE public_api_keys SET last_used_at = ? WHERE id = ?")
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
