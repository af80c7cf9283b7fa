// rest/routes/sdk.rs — public-key-authenticated ingest.
//
// The {slug} segment routes; the X-API-Key header authorizes. A key used
// against another app's slug is a 403 even though it authenticated.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::crashes::{CrashEvent, IngestOutcome};
use crate::error::ApiError;
use crate::rest::auth::{require_sdk_app, SdkKey};
use crate::AppContext;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub content: String,
    pub category: Option<String>,
    pub email: Option<String>,
    pub app_version: Option<String>,
    pub platform: Option<String>,
    pub metadata: Option<Value>,
}

pub async fn ingest_crash(
    State(ctx): State<Arc<AppContext>>,
    key: SdkKey,
    Path(slug): Path<String>,
    Json(event): Json<CrashEvent>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    require_sdk_app(&ctx, &key.0, &slug).await?;
    let outcome = ctx
        .crashes
        .ingest(&key.0.app_id, &key.0.key_id, event)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn ingest_feedback(
    State(ctx): State<Arc<AppContext>>,
    key: SdkKey,
    Path(slug): Path<String>,
    Json(body): Json<FeedbackRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_sdk_app(&ctx, &key.0, &slug).await?;
    if body.content.trim().is_empty() {
        return Err(ApiError::validation("content must not be empty"));
    }

    let metadata_json = body
        .metadata
        .as_ref()
        .map(|m| {
            serde_json::to_string(m).map_err(|e| {
                ApiError::Internal(anyhow::Error::new(e).context("serializing feedback metadata"))
            })
        })
        .transpose()?;

    let row = ctx
        .feedback
        .insert(
            &key.0.app_id,
            &key.0.key_id,
            body.content.trim(),
            body.category.as_deref(),
            body.email.as_deref(),
            body.app_version.as_deref(),
            body.platform.as_deref(),
            metadata_json.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": row.id }))))
}
