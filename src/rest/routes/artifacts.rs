// rest/routes/artifacts.rs — two-phase artifact uploads.
//
// presign → publisher PUTs to the returned URL (same Content-Type it asked
// for) → confirm. Direct creation bypasses both phases for externally
// hosted payloads.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ApiError;
use crate::ids::rfc3339_ms;
use crate::rest::auth::AdminKey;
use crate::storage::artifacts::ArtifactRow;
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct ArtifactResponse {
    pub id: String,
    pub release_id: String,
    pub platform: String,
    /// pending | confirmed | direct
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub created_at: String,
}

impl From<ArtifactRow> for ArtifactResponse {
    fn from(row: ArtifactRow) -> Self {
        let state = if row.download_url.is_none() {
            "pending"
        } else if row.storage_key.is_some() {
            "confirmed"
        } else {
            "direct"
        };
        Self {
            id: row.id,
            release_id: row.release_id,
            platform: row.platform,
            state,
            signature: row.signature,
            storage_key: row.storage_key,
            download_url: row.download_url,
            file_size: row.file_size,
            checksum: row.checksum,
            created_at: rfc3339_ms(row.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PresignRequest {
    pub platform: String,
    pub filename: String,
    pub content_type: Option<String>,
    #[serde(default)]
    pub replace_existing: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfirmRequest {
    pub signature: Option<String>,
    pub checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDirectRequest {
    pub platform: String,
    pub download_url: String,
    pub signature: Option<String>,
    pub file_size: Option<i64>,
    pub checksum: Option<String>,
}

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
) -> Result<Json<Vec<ArtifactResponse>>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.releases.require_in_app(&app_id, &release_id).await?;
    let rows = ctx.artifacts.list(&release_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn presign(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
    Json(body): Json<PresignRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let grant = ctx
        .uploads
        .presign_artifact(
            &app_id,
            &release_id,
            &body.platform,
            &body.filename,
            body.content_type.as_deref(),
            body.replace_existing,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "presigned_url": grant.presigned_url,
            "storage_key": grant.storage_key,
            "artifact_id": grant.artifact_id,
        })),
    ))
}

pub async fn confirm(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id, artifact_id)): Path<(String, String, String)>,
    body: Option<Json<ConfirmRequest>>,
) -> Result<Json<Value>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let row = ctx
        .uploads
        .confirm_artifact(
            &app_id,
            &release_id,
            &artifact_id,
            body.signature.as_deref(),
            body.checksum.as_deref(),
        )
        .await?;
    Ok(Json(json!({
        "confirmed": true,
        "artifact": ArtifactResponse::from(row),
    })))
}

pub async fn create_direct(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
    Json(body): Json<CreateDirectRequest>,
) -> Result<(StatusCode, Json<ArtifactResponse>), ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let row = ctx
        .uploads
        .create_direct_artifact(
            &app_id,
            &release_id,
            &body.platform,
            &body.download_url,
            body.signature.as_deref(),
            body.file_size,
            body.checksum.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn remove(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id, artifact_id)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.uploads
        .delete_artifact(&app_id, &release_id, &artifact_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
