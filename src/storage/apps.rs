//! App registry — the referential root.

use semver::Version;
use sqlx::SqlitePool;

use crate::error::{is_unique_violation, ApiError};
use crate::ids::{new_id, now_ms};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppRow {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    /// Opaque update-verification key. Presence enforces signed updates.
    pub public_key: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// List projection: the row plus aggregate release facts.
#[derive(Debug, Clone)]
pub struct AppSummary {
    pub app: AppRow,
    pub release_count: i64,
    /// Version of the most recently published release (pub_date desc,
    /// semver desc on ties).
    pub latest_version: Option<String>,
}

#[derive(Clone)]
pub struct AppStore {
    pool: SqlitePool,
}

impl AppStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        slug: &str,
        name: &str,
        description: Option<&str>,
        public_key: Option<&str>,
    ) -> Result<AppRow, ApiError> {
        let now = now_ms();
        let id = new_id();
        let res = sqlx::query(
            "INSERT INTO apps (id, slug, name, description, public_key, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(slug)
        .bind(name)
        .bind(description)
        .bind(public_key)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(ApiError::conflict(format!("app slug '{slug}' already exists")));
            }
            Err(e) => return Err(e.into()),
        }

        self.get(&id)
            .await?
            .ok_or_else(|| ApiError::not_found("app"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<AppRow>, ApiError> {
        let row = sqlx::query_as::<_, AppRow>("SELECT * FROM apps WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<AppRow>, ApiError> {
        let row = sqlx::query_as::<_, AppRow>("SELECT * FROM apps WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Load by id or fail with 404.
    pub async fn require(&self, id: &str) -> Result<AppRow, ApiError> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("app '{id}'")))
    }

    /// Load by slug or fail with 404.
    pub async fn require_by_slug(&self, slug: &str) -> Result<AppRow, ApiError> {
        self.get_by_slug(slug)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("app '{slug}'")))
    }

    pub async fn update(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
        public_key: Option<&str>,
    ) -> Result<AppRow, ApiError> {
        let existing = self.require(id).await?;
        let name = name.unwrap_or(existing.name.as_str());
        let description = description.or(existing.description.as_deref());
        let public_key = public_key.or(existing.public_key.as_deref());

        sqlx::query(
            "UPDATE apps SET name = ?, description = ?, public_key = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(public_key)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.require(id).await
    }

    /// Delete an app. Refused while any release is published; drafts and
    /// archived releases (and everything beneath them) cascade away.
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let app = self.require(id).await?;
        let published: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM releases WHERE app_id = ? AND status = 'published'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        if published > 0 {
            return Err(ApiError::conflict(format!(
                "app '{}' still has {published} published release(s)",
                app.slug
            )));
        }
        sqlx::query("DELETE FROM apps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<AppSummary>, i64), ApiError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM apps")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, AppRow>(
            "SELECT * FROM apps ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for app in rows {
            let release_count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM releases WHERE app_id = ?")
                    .bind(&app.id)
                    .fetch_one(&self.pool)
                    .await?;

            let published: Vec<(String, Option<i64>)> = sqlx::query_as(
                "SELECT version, pub_date FROM releases WHERE app_id = ? AND status = 'published'",
            )
            .bind(&app.id)
            .fetch_all(&self.pool)
            .await?;

            summaries.push(AppSummary {
                latest_version: newest_published(published),
                release_count,
                app,
            });
        }
        Ok((summaries, total))
    }
}

/// Most recently published version: pub_date desc, semver desc on ties.
fn newest_published(mut rows: Vec<(String, Option<i64>)>) -> Option<String> {
    rows.sort_by(|(va, da), (vb, db)| {
        db.cmp(da).then_with(|| {
            match (Version::parse(vb), Version::parse(va)) {
                (Ok(b), Ok(a)) => b.cmp(&a),
                _ => vb.cmp(va),
            }
        })
    });
    rows.into_iter().next().map(|(v, _)| v)
}
