// rest/routes/feedback.rs — admin listing of SDK-submitted feedback.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ApiError;
use crate::ids::rfc3339_ms;
use crate::rest::auth::AdminKey;
use crate::rest::{Page, PageParams};
use crate::storage::feedback::FeedbackRow;
use crate::AppContext;

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub id: String,
    pub app_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: String,
}

impl From<FeedbackRow> for FeedbackResponse {
    fn from(row: FeedbackRow) -> Self {
        Self {
            id: row.id,
            app_id: row.app_id,
            content: row.content,
            category: row.category,
            email: row.email,
            app_version: row.app_version,
            platform: row.platform,
            metadata: row
                .metadata
                .as_deref()
                .and_then(|m| serde_json::from_str(m).ok()),
            created_at: rfc3339_ms(row.created_at),
        }
    }
}

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(app_id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<FeedbackResponse>>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.apps.require(&app_id).await?;

    let (limit, offset) = page.bounds(&ctx);
    let (items, total) = ctx.feedback.list(&app_id, limit, offset).await?;
    Ok(Json(Page {
        items: items.into_iter().map(Into::into).collect(),
        total,
        limit,
        offset,
    }))
}
