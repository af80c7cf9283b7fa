//! User feedback rows. Shares the SDK ingest auth path with crashes but has
//! no grouping — each submission is a standalone record.

use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::ids::{new_id, now_ms};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedbackRow {
    pub id: String,
    pub app_id: String,
    pub public_key_id: String,
    pub content: String,
    pub category: Option<String>,
    pub email: Option<String>,
    pub app_version: Option<String>,
    pub platform: Option<String>,
    /// Opaque JSON blob from the SDK.
    pub metadata: Option<String>,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct FeedbackStore {
    pool: SqlitePool,
}

impl FeedbackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        app_id: &str,
        public_key_id: &str,
        content: &str,
        category: Option<&str>,
        email: Option<&str>,
        app_version: Option<&str>,
        platform: Option<&str>,
        metadata_json: Option<&str>,
    ) -> Result<FeedbackRow, ApiError> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO feedback
               (id, app_id, public_key_id, content, category, email, app_version, platform, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(app_id)
        .bind(public_key_id)
        .bind(content)
        .bind(category)
        .bind(email)
        .bind(app_version)
        .bind(platform)
        .bind(metadata_json)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, FeedbackRow>("SELECT * FROM feedback WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list(
        &self,
        app_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<FeedbackRow>, i64), ApiError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE app_id = ?")
            .bind(app_id)
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query_as::<_, FeedbackRow>(
            "SELECT * FROM feedback WHERE app_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(app_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok((rows, total))
    }
}
