// rest/routes/health.rs — liveness endpoint, no auth.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppContext;

pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let db_ok = ctx.storage.ping().await.is_ok();
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": ctx.started_at.elapsed().as_secs(),
        "database": if db_ok { "ok" } else { "unreachable" },
    }))
}
