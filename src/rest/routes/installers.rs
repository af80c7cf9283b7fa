// rest/routes/installers.rs — installer uploads.
//
// Same two-phase protocol as artifacts with the broader platform enum and a
// required, sanitized filename. Installers carry no update signature — they
// are downloaded by browsers, not applied by the updater.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ApiError;
use crate::ids::rfc3339_ms;
use crate::rest::auth::AdminKey;
use crate::storage::artifacts::InstallerRow;
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct InstallerResponse {
    pub id: String,
    pub release_id: String,
    pub platform: String,
    pub filename: String,
    /// pending | confirmed | direct
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
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

impl From<InstallerRow> for InstallerResponse {
    fn from(row: InstallerRow) -> Self {
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
            filename: row.filename,
            state,
            display_name: row.display_name,
            storage_key: row.storage_key,
            download_url: row.download_url,
            file_size: row.file_size,
            checksum: row.checksum,
            created_at: rfc3339_ms(row.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PresignInstallerRequest {
    pub platform: String,
    pub filename: String,
    pub display_name: Option<String>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub replace_existing: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfirmInstallerRequest {
    pub checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDirectInstallerRequest {
    pub platform: String,
    pub filename: String,
    pub display_name: Option<String>,
    pub download_url: String,
    pub file_size: Option<i64>,
}

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
) -> Result<Json<Vec<InstallerResponse>>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.releases.require_in_app(&app_id, &release_id).await?;
    let rows = ctx.installers.list(&release_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn presign(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
    Json(body): Json<PresignInstallerRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let grant = ctx
        .uploads
        .presign_installer(
            &app_id,
            &release_id,
            &body.platform,
            &body.filename,
            body.display_name.as_deref(),
            body.content_type.as_deref(),
            body.replace_existing,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "presigned_url": grant.presigned_url,
            "storage_key": grant.storage_key,
            "installer_id": grant.artifact_id,
        })),
    ))
}

pub async fn confirm(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id, installer_id)): Path<(String, String, String)>,
    body: Option<Json<ConfirmInstallerRequest>>,
) -> Result<Json<Value>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let row = ctx
        .uploads
        .confirm_installer(&app_id, &release_id, &installer_id, body.checksum.as_deref())
        .await?;
    Ok(Json(json!({
        "confirmed": true,
        "installer": InstallerResponse::from(row),
    })))
}

pub async fn create_direct(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id)): Path<(String, String)>,
    Json(body): Json<CreateDirectInstallerRequest>,
) -> Result<(StatusCode, Json<InstallerResponse>), ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let row = ctx
        .uploads
        .create_direct_installer(
            &app_id,
            &release_id,
            &body.platform,
            &body.filename,
            body.display_name.as_deref(),
            &body.download_url,
            body.file_size,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn remove(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, release_id, installer_id)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.uploads
        .delete_installer(&app_id, &release_id, &installer_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
