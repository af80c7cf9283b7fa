// rest/routes/ci.rs — one-shot release creation for pipelines.
//
// The pipeline uploads objects to the bucket itself, then calls this with
// the keys. Each object is HEADed to populate sizes, linked as a confirmed
// artifact/installer, and the release optionally auto-published.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ApiError;
use crate::rest::auth::AdminKey;
use crate::rest::routes::artifacts::ArtifactResponse;
use crate::rest::routes::installers::InstallerResponse;
use crate::rest::routes::releases::ReleaseResponse;
use crate::validate::parse_version;
use crate::AppContext;

#[derive(Debug, Deserialize)]
pub struct CiArtifact {
    pub platform: String,
    pub signature: Option<String>,
    /// Object key the pipeline already uploaded to.
    pub r2_key: String,
    pub checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CiInstaller {
    pub platform: String,
    pub r2_key: String,
    pub filename: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CiReleaseRequest {
    pub version: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<CiArtifact>,
    #[serde(default)]
    pub installers: Vec<CiInstaller>,
    #[serde(default)]
    pub auto_publish: bool,
}

pub async fn create_release(
    State(ctx): State<Arc<AppContext>>,
    admin: AdminKey,
    Path(slug): Path<String>,
    Json(body): Json<CiReleaseRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let app = ctx.apps.require_by_slug(&slug).await?;
    admin.0.ensure_app_access(&app.id)?;
    parse_version(&body.version)?;

    let mut release = ctx
        .releases
        .create(&app.id, body.version.trim(), body.notes.as_deref())
        .await?;

    let mut artifacts = Vec::with_capacity(body.artifacts.len());
    for artifact in &body.artifacts {
        let row = ctx
            .uploads
            .link_uploaded_artifact(
                &release,
                &artifact.platform,
                &artifact.r2_key,
                artifact.signature.as_deref(),
                artifact.checksum.as_deref(),
            )
            .await?;
        artifacts.push(ArtifactResponse::from(row));
    }

    let mut installers = Vec::with_capacity(body.installers.len());
    for installer in &body.installers {
        let row = ctx
            .uploads
            .link_uploaded_installer(
                &release,
                &installer.platform,
                &installer.r2_key,
                installer.filename.as_deref(),
                installer.display_name.as_deref(),
            )
            .await?;
        installers.push(InstallerResponse::from(row));
    }

    if body.auto_publish {
        release = ctx.releases.publish(&release.id).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "release": ReleaseResponse::from(release),
            "artifacts": artifacts,
            "installers": installers,
        })),
    ))
}
