//! Download telemetry, fire-and-forget.
//!
//! Manifest serves and installer redirects record an event row from a
//! detached task. A failed insert costs a warning line, never a response.

use sqlx::SqlitePool;
use tracing::warn;

use crate::ids::{new_id, now_ms};

pub const KIND_UPDATE: &str = "update";
pub const KIND_INSTALLER: &str = "installer";

#[derive(Clone)]
pub struct DownloadRecorder {
    pool: SqlitePool,
}

impl DownloadRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn record_update(&self, app_id: &str, artifact_id: &str, platform: &str, version: &str) {
        self.record(KIND_UPDATE, app_id, artifact_id, platform, version);
    }

    pub fn record_installer(
        &self,
        app_id: &str,
        installer_id: &str,
        platform: &str,
        version: &str,
    ) {
        self.record(KIND_INSTALLER, app_id, installer_id, platform, version);
    }

    fn record(&self, kind: &'static str, app_id: &str, artifact_id: &str, platform: &str, version: &str) {
        let pool = self.pool.clone();
        let (app_id, artifact_id, platform, version) = (
            app_id.to_string(),
            artifact_id.to_string(),
            platform.to_string(),
            version.to_string(),
        );
        tokio::spawn(async move {
            let res = sqlx::query(
                "INSERT INTO download_events (id, app_id, kind, artifact_id, platform, version, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(new_id())
            .bind(&app_id)
            .bind(kind)
            .bind(&artifact_id)
            .bind(&platform)
            .bind(&version)
            .bind(now_ms())
            .execute(&pool)
            .await;
            if let Err(e) = res {
                warn!(app_id = %app_id, kind = kind, err = %e, "failed to record download event");
            }
        });
    }
}
