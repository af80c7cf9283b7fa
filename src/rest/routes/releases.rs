// rest/routes/releases.rs — release catalog and its state machine.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::ids::rfc3339_ms;
use crate::rest::auth::AdminKey;
use crate::rest::{Page, PageParams};
use crate::storage::releases::{ReleaseRow, STATUS_ARCHIVED, STATUS_DRAFT, STATUS_PUBLISHED};
use crate::validate::parse_version;
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub id: String,
    pub app_id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ReleaseRow> for ReleaseResponse {
    fn from(row: ReleaseRow) -> Self {
        Self {
            id: row.id,
            app_id: row.app_id,
            version: row.version,
            notes: row.notes,
            status: row.status,
            pub_date: row.pub_date.map(rfc3339_ms),
            created_at: rfc3339_ms(row.created_at),
            updated_at: rfc3339_ms(row.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReleaseRequest {
    pub version: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReleaseRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListReleasesQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(app_id): Path<String>,
    Query(query): Query<ListReleasesQuery>,
) -> Result<Json<Page<ReleaseResponse>>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.apps.require(&app_id).await?;

    if let Some(status) = query.status.as_deref() {
        if ![STATUS_DRAFT, STATUS_PUBLISHED, STATUS_ARCHIVED].contains(&status) {
            return Err(ApiError::validation(format!(
                "unknown release status '{status}'"
            )));
        }
    }

    let page = PageParams {
        limit: query.limit,
        offset: query.offset,
    };
    let (limit, offset) = page.bounds(&ctx);
    let (items, total) = ctx
        .releases
        .list(&app_id, query.status.as_deref(), limit, offset)
        .await?;
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
    Path(app_id): Path<String>,
    Json(body): Json<CreateReleaseRequest>,
) -> Result<(StatusCode, Json<ReleaseResponse>), ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.apps.require(&app_id).await?;
    parse_version(&body.version)?;

    let row = ctx
        .releases
        .create(&app_id, body.version.trim(), body.notes.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let row = ctx.releases.require_in_app(&app_id, &release_id).await?;
    Ok(Json(row.into()))
}

pub async fn update(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
    Json(body): Json<UpdateReleaseRequest>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.releases.require_in_app(&app_id, &release_id).await?;
    let row = ctx
        .releases
        .update_notes(&release_id, body.notes.as_deref())
        .await?;
    Ok(Json(row.into()))
}

pub async fn publish(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.releases.require_in_app(&app_id, &release_id).await?;
    let row = ctx.releases.publish(&release_id).await?;
    Ok(Json(row.into()))
}

pub async fn archive(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.releases.require_in_app(&app_id, &release_id).await?;
    let row = ctx.releases.archive(&release_id).await?;
    Ok(Json(row.into()))
}

pub async fn remove(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.releases.require_in_app(&app_id, &release_id).await?;
    ctx.releases.delete(&release_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
