// rest/routes/apps.rs — app registry CRUD.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::check_public_key_shape;
use crate::error::ApiError;
use crate::ids::rfc3339_ms;
use crate::rest::auth::AdminKey;
use crate::rest::{Page, PageParams};
use crate::storage::apps::{AppRow, AppSummary};
use crate::validate::validate_slug;
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct AppResponse {
    pub id: String,
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<AppRow> for AppResponse {
    fn from(row: AppRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            public_key: row.public_key,
            created_at: rfc3339_ms(row.created_at),
            updated_at: rfc3339_ms(row.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AppSummaryResponse {
    #[serde(flatten)]
    pub app: AppResponse,
    pub release_count: i64,
    pub latest_version: Option<String>,
}

impl From<AppSummary> for AppSummaryResponse {
    fn from(summary: AppSummary) -> Self {
        Self {
            app: summary.app.into(),
            release_count: summary.release_count,
            latest_version: summary.latest_version,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAppRequest {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub public_key: Option<String>,
}

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<AppSummaryResponse>>, ApiError> {
    admin.0.ensure_admin()?;
    let (limit, offset) = page.bounds(&ctx);
    let (items, total) = ctx.apps.list(limit, offset).await?;
    Ok(Json(Page {
        items: items.into_iter().map(Into::into).collect(),
        total,
        limit,
        offset,
    }))
}

pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Json(body): Json<CreateAppRequest>,
) -> Result<(StatusCode, Json<AppResponse>), ApiError> {
    admin.0.ensure_admin()?;
    validate_slug(&body.slug)?;
    if body.name.trim().is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    if let Some(key) = &body.public_key {
        check_public_key_shape(key)?;
    }

    let row = ctx
        .apps
        .create(
            &body.slug,
            body.name.trim(),
            body.description.as_deref(),
            body.public_key.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(app_id): Path<String>,
) -> Result<Json<AppResponse>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let row = ctx.apps.require(&app_id).await?;
    Ok(Json(row.into()))
}

pub async fn update(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(app_id): Path<String>,
    Json(body): Json<UpdateAppRequest>,
) -> Result<Json<AppResponse>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("name must not be empty"));
        }
    }
    if let Some(key) = &body.public_key {
        check_public_key_shape(key)?;
    }

    let row = ctx
        .apps
        .update(
            &app_id,
            body.name.as_deref(),
            body.description.as_deref(),
            body.public_key.as_deref(),
        )
        .await?;
    Ok(Json(row.into()))
}

pub async fn remove(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(app_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.apps.delete(&app_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
