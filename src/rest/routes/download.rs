// rest/routes/download.rs — public installer downloads.
//
//   GET /{slug}/download/{platform}[/{version}][?format=json]
//
// Default is a 302 to the object URL; `format=json` returns a descriptor
// instead (used by download pages that render their own button).

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::ids::rfc3339_ms;
use crate::resolver::ResolvedInstaller;
use crate::AppContext;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstallerDescriptor {
    pub id: String,
    pub platform: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

pub async fn latest(
    State(ctx): State<Arc<AppContext>>,
    Path((slug, platform)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let resolved = ctx.resolver.resolve_installer(&slug, &platform, None).await?;
    Ok(respond(resolved, &query))
}

pub async fn versioned(
    State(ctx): State<Arc<AppContext>>,
    Path((slug, platform, version)): Path<(String, String, String)>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let resolved = ctx
        .resolver
        .resolve_installer(&slug, &platform, Some(&version))
        .await?;
    Ok(respond(resolved, &query))
}

fn respond(resolved: ResolvedInstaller, query: &DownloadQuery) -> Response {
    if query.format.as_deref() == Some("json") {
        let descriptor = InstallerDescriptor {
            id: resolved.installer.id,
            platform: resolved.installer.platform,
            filename: resolved.installer.filename,
            display_name: resolved.installer.display_name,
            download_url: resolved.download_url,
            file_size: resolved.installer.file_size,
            version: resolved.release.version,
            release_notes: resolved.release.notes,
            published_at: resolved.release.pub_date.map(rfc3339_ms),
        };
        return Json(descriptor).into_response();
    }
    (
        StatusCode::FOUND,
        [(header::LOCATION, resolved.download_url)],
    )
        .into_response()
}
