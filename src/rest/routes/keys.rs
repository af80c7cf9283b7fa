// rest/routes/keys.rs — credential management.
//
// Creation responses carry the plaintext exactly once; list/get responses
// never do. Revocation is a soft mark, not a delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::KeyScope;
use crate::error::ApiError;
use crate::ids::rfc3339_ms;
use crate::rest::auth::AdminKey;
use crate::storage::keys::{ApiKeyRow, PublicApiKeyRow};
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<String>,
}

impl From<ApiKeyRow> for ApiKeyResponse {
    fn from(row: ApiKeyRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            scope: row.scope,
            app_id: row.app_id,
            last_used_at: row.last_used_at.map(rfc3339_ms),
            created_at: rfc3339_ms(row.created_at),
            revoked_at: row.revoked_at.map(rfc3339_ms),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub id: String,
    pub app_id: String,
    pub name: String,
    pub key_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<String>,
}

impl From<PublicApiKeyRow> for PublicKeyResponse {
    fn from(row: PublicApiKeyRow) -> Self {
        Self {
            id: row.id,
            app_id: row.app_id,
            name: row.name,
            key_prefix: row.key_prefix,
            last_used_at: row.last_used_at.map(rfc3339_ms),
            created_at: rfc3339_ms(row.created_at),
            revoked_at: row.revoked_at.map(rfc3339_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBearerKeyRequest {
    pub name: String,
    /// "admin" or "ci".
    pub scope: String,
    /// Required for ci scope, forbidden for admin.
    pub app_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePublicKeyRequest {
    pub name: String,
}

// ─── Bearer keys ──────────────────────────────────────────────────────────────

pub async fn list_bearer(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
) -> Result<Json<Vec<ApiKeyResponse>>, ApiError> {
    admin.0.ensure_admin()?;
    let rows = ctx.keys.store().list_api_keys().await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn create_bearer(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Json(body): Json<CreateBearerKeyRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    admin.0.ensure_admin()?;
    if body.name.trim().is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    let scope = KeyScope::parse(&body.scope)?;
    if let Some(app_id) = &body.app_id {
        ctx.apps.require(app_id).await?;
    }

    let (plaintext, row) = ctx
        .keys
        .create_bearer_key(body.name.trim(), scope, body.app_id.as_deref())
        .await?;
    // `key` is the only copy of the plaintext that will ever exist.
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "key": plaintext,
            "api_key": ApiKeyResponse::from(row),
        })),
    ))
}

pub async fn revoke_bearer(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(key_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    admin.0.ensure_admin()?;
    ctx.keys.store().revoke_api_key(&key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── SDK public keys ──────────────────────────────────────────────────────────

pub async fn list_public(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(app_id): Path<String>,
) -> Result<Json<Vec<PublicKeyResponse>>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.apps.require(&app_id).await?;
    let rows = ctx.keys.store().list_public_keys(&app_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn create_public(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(app_id): Path<String>,
    Json(body): Json<CreatePublicKeyRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    if body.name.trim().is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    let app = ctx.apps.require(&app_id).await?;

    let (plaintext, row) = ctx
        .keys
        .create_public_key(&app.id, &app.slug, body.name.trim())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "key": plaintext,
            "public_key": PublicKeyResponse::from(row),
        })),
    ))
}

pub async fn revoke_public(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, key_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.keys.store().revoke_public_key(&app_id, &key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
