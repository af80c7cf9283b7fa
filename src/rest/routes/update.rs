// rest/routes/update.rs — the Tauri-compatible update check.
//
//   GET /{slug}/update/{target}/{current_version}
//   GET /{slug}/update/{os}/{arch}/{current_version}
//
// 200 + manifest when a newer matching artifact exists, 204 otherwise,
// 404 for unknown apps, 400 for malformed targets or versions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppContext;

pub async fn check_target(
    State(ctx): State<Arc<AppContext>>,
    Path((slug, target, current_version)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    respond(&ctx, &slug, &target, &current_version).await
}

/// Alternate `os`/`arch` form; the segments are joined and normalised the
/// same way as a single target.
pub async fn check_os_arch(
    State(ctx): State<Arc<AppContext>>,
    Path((slug, os, arch, current_version)): Path<(String, String, String, String)>,
) -> Result<Response, ApiError> {
    let target = format!("{os}-{arch}");
    respond(&ctx, &slug, &target, &current_version).await
}

async fn respond(
    ctx: &AppContext,
    slug: &str,
    target: &str,
    current_version: &str,
) -> Result<Response, ApiError> {
    match ctx.resolver.check_update(slug, target, current_version).await? {
        Some(manifest) => Ok(Json(manifest).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
