// rest/routes/crashes.rs — crash-group triage and statistics.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::crashes::StatsWindow;
use crate::error::ApiError;
use crate::ids::rfc3339_ms;
use crate::rest::auth::AdminKey;
use crate::rest::{Page, PageParams};
use crate::storage::crashes::{CrashGroupRow, CrashReportRow, GROUP_STATUSES};
use crate::AppContext;

const DEFAULT_TOP_GROUPS: i64 = 10;

#[derive(Debug, Serialize)]
pub struct CrashGroupResponse {
    pub id: String,
    pub app_id: String,
    pub fingerprint: String,
    pub error_type: String,
    pub error_message: String,
    pub occurrence_count: i64,
    pub affected_users_count: i64,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub affected_versions: Vec<String>,
    pub affected_platforms: Vec<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CrashGroupRow> for CrashGroupResponse {
    fn from(row: CrashGroupRow) -> Self {
        Self {
            id: row.id,
            app_id: row.app_id,
            fingerprint: row.fingerprint,
            error_type: row.error_type,
            error_message: row.error_message,
            occurrence_count: row.occurrence_count,
            affected_users_count: row.affected_users_count,
            first_seen_at: rfc3339_ms(row.first_seen_at),
            last_seen_at: rfc3339_ms(row.last_seen_at),
            affected_versions: parse_set(&row.affected_versions),
            affected_platforms: parse_set(&row.affected_platforms),
            status: row.status,
            assignee: row.assignee,
            resolution_notes: row.resolution_notes,
            resolved_at: row.resolved_at.map(rfc3339_ms),
            created_at: rfc3339_ms(row.created_at),
            updated_at: rfc3339_ms(row.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CrashReportResponse {
    pub id: String,
    pub crash_group_id: String,
    pub error_type: String,
    pub error_message: String,
    pub stack_trace: Value,
    pub app_version: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_state: Option<Value>,
    pub breadcrumbs: Value,
    pub fingerprint: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: String,
}

impl From<CrashReportRow> for CrashReportResponse {
    fn from(row: CrashReportRow) -> Self {
        Self {
            id: row.id,
            crash_group_id: row.crash_group_id,
            error_type: row.error_type,
            error_message: row.error_message,
            stack_trace: parse_json(&row.stack_trace),
            app_version: row.app_version,
            platform: row.platform,
            os_version: row.os_version,
            device_info: row.device_info.as_deref().map(parse_json),
            app_state: row.app_state.as_deref().map(parse_json),
            breadcrumbs: parse_json(&row.breadcrumbs),
            fingerprint: row.fingerprint,
            severity: row.severity,
            user_id: row.user_id,
            created_at: rfc3339_ms(row.created_at),
        }
    }
}

fn parse_set(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

fn parse_json(json: &str) -> Value {
    serde_json::from_str(json).unwrap_or(Value::Null)
}

#[derive(Debug, Deserialize)]
pub struct ListGroupsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// 24h | 7d | 30d | 90d (default 7d).
    pub window: Option<String>,
    /// How many top groups to include (default 10).
    pub top: Option<i64>,
}

pub async fn list_groups(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(app_id): Path<String>,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<Page<CrashGroupResponse>>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.apps.require(&app_id).await?;

    if let Some(status) = query.status.as_deref() {
        if !GROUP_STATUSES.contains(&status) {
            return Err(ApiError::validation(format!(
                "unknown crash status '{status}'"
            )));
        }
    }

    let page = PageParams {
        limit: query.limit,
        offset: query.offset,
    };
    let (limit, offset) = page.bounds(&ctx);
    let (items, total) = ctx
        .crashes
        .store()
        .list_groups(&app_id, query.status.as_deref(), limit, offset)
        .await?;
    Ok(Json(Page {
        items: items.into_iter().map(Into::into).collect(),
        total,
        limit,
        offset,
    }))
}

pub async fn get_group(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, group_id)): Path<(String, String)>,
) -> Result<Json<CrashGroupResponse>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let row = ctx.crashes.store().require_group(&app_id, &group_id).await?;
    Ok(Json(row.into()))
}

pub async fn update_group(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, group_id)): Path<(String, String)>,
    Json(body): Json<UpdateGroupRequest>,
) -> Result<Json<CrashGroupResponse>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    let row = ctx
        .crashes
        .store()
        .update_group(
            &app_id,
            &group_id,
            body.status.as_deref(),
            body.assignee.as_deref(),
            body.resolution_notes.as_deref(),
        )
        .await?;
    Ok(Json(row.into()))
}

pub async fn list_reports(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path((app_id, group_id)): Path<(String, String)>,
    Query(page): Query<PageParams>,
) -> Result<Json<Page<CrashReportResponse>>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.crashes.store().require_group(&app_id, &group_id).await?;

    let (limit, offset) = page.bounds(&ctx);
    let (items, total) = ctx
        .crashes
        .store()
        .list_reports(&group_id, limit, offset)
        .await?;
    Ok(Json(Page {
        items: items.into_iter().map(Into::into).collect(),
        total,
        limit,
        offset,
    }))
}

pub async fn stats(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(app_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    admin.0.ensure_app_access(&app_id)?;
    ctx.apps.require(&app_id).await?;

    let window = StatsWindow::parse(query.window.as_deref().unwrap_or("7d"))?;
    let since = crate::ids::now_ms() - window.millis();
    let top_n = query.top.unwrap_or(DEFAULT_TOP_GROUPS).clamp(1, 100);

    let stats = ctx.crashes.store().stats(&app_id, since).await?;
    let top_groups: Vec<CrashGroupResponse> = ctx
        .crashes
        .store()
        .top_groups(&app_id, since, top_n)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(serde_json::json!({
        "window": window.as_str(),
        "total_reports": stats.total_reports,
        "total_groups": stats.total_groups,
        "affected_users": stats.affected_users,
        "by_day": stats.by_day,
        "by_version": stats.by_version,
        "by_platform": stats.by_platform,
        "top_groups": top_groups,
    })))
}
