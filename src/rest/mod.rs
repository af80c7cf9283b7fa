// rest/mod.rs — HTTP surfaces.
//
// Three surfaces share one router:
//   /admin/…          bearer-key CRUD over apps, releases, artifacts, keys,
//                     crash groups, feedback
//   /ci/…             one-shot release creation for pipelines
//   /sdk/{slug}/…     public-key-authenticated feedback/crash ingest
//   /{slug}/update/…  unauthenticated, idempotent update checks
//   /{slug}/download/… installer redirects
//
// Handlers stay thin: parse, authenticate, call a service, shape the
// response. Error translation happens once, in ApiError::into_response.

pub mod auth;
pub mod routes;

use anyhow::Result;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::AppContext;

pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Oasis API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let cors = cors_layer(&ctx.config.cors_origins);

    Router::new()
        // Health (no auth)
        .route("/health", get(routes::health::health))
        // Admin surface
        .nest("/admin", admin_router())
        // CI one-shot release
        .route("/ci/apps/{slug}/releases", post(routes::ci::create_release))
        // SDK ingest
        .route("/sdk/{slug}/feedback", post(routes::sdk::ingest_feedback))
        .route("/sdk/{slug}/crashes", post(routes::sdk::ingest_crash))
        // Public update checks (Tauri updater protocol)
        .route(
            "/{slug}/update/{target}/{current_version}",
            get(routes::update::check_target),
        )
        .route(
            "/{slug}/update/{os}/{arch}/{current_version}",
            get(routes::update::check_os_arch),
        )
        // Public installer downloads
        .route(
            "/{slug}/download/{platform}",
            get(routes::download::latest),
        )
        .route(
            "/{slug}/download/{platform}/{version}",
            get(routes::download::versioned),
        )
        .layer(cors)
        .with_state(ctx)
}

fn admin_router() -> Router<Arc<AppContext>> {
    Router::new()
        // Apps
        .route(
            "/apps",
            get(routes::apps::list).post(routes::apps::create),
        )
        .route(
            "/apps/{app_id}",
            get(routes::apps::get)
                .patch(routes::apps::update)
                .delete(routes::apps::remove),
        )
        // Bearer keys (admin/CI)
        .route(
            "/keys",
            get(routes::keys::list_bearer).post(routes::keys::create_bearer),
        )
        .route("/keys/{key_id}", delete(routes::keys::revoke_bearer))
        // Per-app SDK keys
        .route(
            "/apps/{app_id}/keys",
            get(routes::keys::list_public).post(routes::keys::create_public),
        )
        .route(
            "/apps/{app_id}/keys/{key_id}",
            delete(routes::keys::revoke_public),
        )
        // Releases
        .route(
            "/apps/{app_id}/releases",
            get(routes::releases::list).post(routes::releases::create),
        )
        .route(
            "/apps/{app_id}/releases/{release_id}",
            get(routes::releases::get)
                .patch(routes::releases::update)
                .delete(routes::releases::remove),
        )
        .route(
            "/apps/{app_id}/releases/{release_id}/publish",
            post(routes::releases::publish),
        )
        .route(
            "/apps/{app_id}/releases/{release_id}/archive",
            post(routes::releases::archive),
        )
        // Artifacts (two-phase upload)
        .route(
            "/apps/{app_id}/releases/{release_id}/artifacts",
            get(routes::artifacts::list).post(routes::artifacts::create_direct),
        )
        .route(
            "/apps/{app_id}/releases/{release_id}/artifacts/presign",
            post(routes::artifacts::presign),
        )
        .route(
            "/apps/{app_id}/releases/{release_id}/artifacts/{artifact_id}/confirm",
            post(routes::artifacts::confirm),
        )
        .route(
            "/apps/{app_id}/releases/{release_id}/artifacts/{artifact_id}",
            delete(routes::artifacts::remove),
        )
        // Installers (same protocol, broader platform enum)
        .route(
            "/apps/{app_id}/releases/{release_id}/installers",
            get(routes::installers::list).post(routes::installers::create_direct),
        )
        .route(
            "/apps/{app_id}/releases/{release_id}/installers/presign",
            post(routes::installers::presign),
        )
        .route(
            "/apps/{app_id}/releases/{release_id}/installers/{installer_id}/confirm",
            post(routes::installers::confirm),
        )
        .route(
            "/apps/{app_id}/releases/{release_id}/installers/{installer_id}",
            delete(routes::installers::remove),
        )
        // Crash triage
        .route("/apps/{app_id}/crashes", get(routes::crashes::list_groups))
        .route(
            "/apps/{app_id}/crashes/stats",
            get(routes::crashes::stats),
        )
        .route(
            "/apps/{app_id}/crashes/{group_id}",
            get(routes::crashes::get_group).patch(routes::crashes::update_group),
        )
        .route(
            "/apps/{app_id}/crashes/{group_id}/reports",
            get(routes::crashes::list_reports),
        )
        // Feedback
        .route("/apps/{app_id}/feedback", get(routes::feedback::list))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new();
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}

// ─── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    /// Clamp against the configured defaults.
    pub fn bounds(&self, ctx: &AppContext) -> (i64, i64) {
        crate::storage::page_bounds(
            self.limit,
            self.offset,
            ctx.config.default_page_limit,
            ctx.config.max_page_limit,
        )
    }
}

/// Envelope for every admin list endpoint.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
