//! Artifact & installer upload orchestration.
//!
//! Two independent stores — the database and the object store — are kept
//! consistent with a two-phase protocol:
//!
//!   presign: reserve the `(release, platform)` slot as a *pending* row and
//!            hand the publisher a presigned PUT URL (1 hour).
//!   confirm: verify the object actually landed (exists + HEAD), resolve a
//!            durable download URL, write it through to the row.
//!
//! A crash between the phases leaves a pending row; pending rows are never
//! served (the resolver filters on `download_url`), and the next presign
//! with `replace_existing` cleans them up. Object deletion is always
//! best-effort: logged, never surfaced.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::ApiError;
use crate::object_store::{artifact_key, installer_key, ObjectStore};
use crate::platform::{normalize_installer_platform, normalize_target};
use crate::storage::apps::{AppRow, AppStore};
use crate::storage::artifacts::{ArtifactRow, ArtifactStore, InstallerRow, InstallerStore};
use crate::storage::releases::{ReleaseRow, ReleaseStore};
use crate::validate::{sanitize_filename, validate_checksum};

/// Presigned PUT URLs are valid for one hour.
pub const PRESIGN_PUT_TTL: Duration = Duration::from_secs(60 * 60);

/// Signed GET fallback when no public base URL is configured.
pub const SIGNED_GET_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Phase-1 result handed back to the publisher.
#[derive(Debug, Clone)]
pub struct PresignGrant {
    pub presigned_url: String,
    pub storage_key: String,
    pub artifact_id: String,
}

#[derive(Clone)]
pub struct UploadManager {
    apps: AppStore,
    releases: ReleaseStore,
    artifacts: ArtifactStore,
    installers: InstallerStore,
    store: Arc<dyn ObjectStore>,
}

impl UploadManager {
    pub fn new(
        apps: AppStore,
        releases: ReleaseStore,
        artifacts: ArtifactStore,
        installers: InstallerStore,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            apps,
            releases,
            artifacts,
            installers,
            store,
        }
    }

    /// Durable URL for a stored object: stable public URL when configured,
    /// else a 7-day signed GET.
    pub async fn resolve_download_url(&self, key: &str) -> Result<String, ApiError> {
        if let Some(url) = self.store.public_url(key) {
            return Ok(url);
        }
        Ok(self.store.presign_get(key, SIGNED_GET_TTL).await?)
    }

    /// Delete an object without letting failures escape.
    async fn delete_object_best_effort(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key = %key, err = %e, "best-effort object delete failed");
        }
    }

    async fn load_release(
        &self,
        app_id: &str,
        release_id: &str,
    ) -> Result<(AppRow, ReleaseRow), ApiError> {
        let app = self.apps.require(app_id).await?;
        let release = self.releases.require_in_app(app_id, release_id).await?;
        Ok((app, release))
    }

    // ─── Artifacts ───────────────────────────────────────────────────────────

    /// Phase 1: reserve the slot and presign the upload.
    pub async fn presign_artifact(
        &self,
        app_id: &str,
        release_id: &str,
        platform: &str,
        filename: &str,
        content_type: Option<&str>,
        replace_existing: bool,
    ) -> Result<PresignGrant, ApiError> {
        let (app, release) = self.load_release(app_id, release_id).await?;
        let platform = normalize_target(platform)?;
        let filename = sanitize_filename(filename)?;

        if let Some(old) = self
            .artifacts
            .get_by_platform(release_id, platform.as_str())
            .await?
        {
            if !replace_existing {
                return Err(ApiError::conflict(format!(
                    "artifact for '{platform}' already exists; pass replace_existing to overwrite"
                )));
            }
            if let Some(key) = &old.storage_key {
                self.delete_object_best_effort(key).await;
            }
            self.artifacts.delete(&old.id).await?;
            info!(artifact = %old.id, platform = %platform, "replaced existing artifact");
        }

        let storage_key = artifact_key(&app.slug, &release.version, &filename);
        let presigned_url = self
            .store
            .presign_put(&storage_key, PRESIGN_PUT_TTL, content_type)
            .await?;
        let row = self
            .artifacts
            .insert_pending(release_id, platform.as_str(), &storage_key)
            .await?;

        Ok(PresignGrant {
            presigned_url,
            storage_key,
            artifact_id: row.id,
        })
    }

    /// Phase 2: verify the upload landed and write the row through.
    pub async fn confirm_artifact(
        &self,
        app_id: &str,
        release_id: &str,
        artifact_id: &str,
        signature: Option<&str>,
        checksum: Option<&str>,
    ) -> Result<ArtifactRow, ApiError> {
        self.load_release(app_id, release_id).await?;
        let row = self
            .artifacts
            .require_in_release(release_id, artifact_id)
            .await?;

        let Some(storage_key) = row.storage_key.as_deref().filter(|_| row.is_pending()) else {
            return Err(ApiError::NotPending);
        };
        if let Some(checksum) = checksum {
            validate_checksum(checksum)?;
        }

        if !self.store.exists(storage_key).await? {
            return Err(ApiError::NotFoundInStorage);
        }
        let meta = self.store.head(storage_key).await?;
        let download_url = self.resolve_download_url(storage_key).await?;

        self.artifacts
            .confirm(artifact_id, &download_url, meta.size, signature, checksum)
            .await
    }

    /// Externally-hosted artifact; the two-phase protocol is bypassed.
    pub async fn create_direct_artifact(
        &self,
        app_id: &str,
        release_id: &str,
        platform: &str,
        download_url: &str,
        signature: Option<&str>,
        file_size: Option<i64>,
        checksum: Option<&str>,
    ) -> Result<ArtifactRow, ApiError> {
        self.load_release(app_id, release_id).await?;
        let platform = normalize_target(platform)?;
        validate_download_url(download_url)?;
        if let Some(checksum) = checksum {
            validate_checksum(checksum)?;
        }
        self.artifacts
            .insert_direct(
                release_id,
                platform.as_str(),
                download_url,
                signature,
                file_size,
                checksum,
            )
            .await
    }

    pub async fn delete_artifact(
        &self,
        app_id: &str,
        release_id: &str,
        artifact_id: &str,
    ) -> Result<(), ApiError> {
        self.load_release(app_id, release_id).await?;
        let row = self
            .artifacts
            .require_in_release(release_id, artifact_id)
            .await?;
        self.artifacts.delete(&row.id).await?;
        if let Some(key) = &row.storage_key {
            self.delete_object_best_effort(key).await;
        }
        Ok(())
    }

    /// CI path: the object was uploaded out-of-band; HEAD it for the size,
    /// resolve the URL, and land the row already confirmed.
    pub async fn link_uploaded_artifact(
        &self,
        release: &ReleaseRow,
        platform: &str,
        storage_key: &str,
        signature: Option<&str>,
        checksum: Option<&str>,
    ) -> Result<ArtifactRow, ApiError> {
        let platform = normalize_target(platform)?;
        let meta = match self.store.head(storage_key).await {
            Ok(meta) => meta,
            Err(crate::object_store::StoreError::NotFound(_)) => {
                return Err(ApiError::NotFoundInStorage)
            }
            Err(e) => return Err(e.into()),
        };
        let download_url = self.resolve_download_url(storage_key).await?;
        self.artifacts
            .insert_confirmed(
                &release.id,
                platform.as_str(),
                storage_key,
                &download_url,
                signature,
                Some(meta.size),
                checksum,
            )
            .await
    }

    // ─── Installers ──────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn presign_installer(
        &self,
        app_id: &str,
        release_id: &str,
        platform: &str,
        filename: &str,
        display_name: Option<&str>,
        content_type: Option<&str>,
        replace_existing: bool,
    ) -> Result<PresignGrant, ApiError> {
        let (app, release) = self.load_release(app_id, release_id).await?;
        let platform = normalize_installer_platform(platform)?;
        let filename = sanitize_filename(filename)?;

        if let Some(old) = self
            .installers
            .get_by_platform(release_id, platform.as_str())
            .await?
        {
            if !replace_existing {
                return Err(ApiError::conflict(format!(
                    "installer for '{platform}' already exists; pass replace_existing to overwrite"
                )));
            }
            if let Some(key) = &old.storage_key {
                self.delete_object_best_effort(key).await;
            }
            self.installers.delete(&old.id).await?;
            info!(installer = %old.id, platform = %platform, "replaced existing installer");
        }

        let storage_key = installer_key(&app.slug, &release.version, &filename);
        let presigned_url = self
            .store
            .presign_put(&storage_key, PRESIGN_PUT_TTL, content_type)
            .await?;
        let row = self
            .installers
            .insert_pending(
                release_id,
                platform.as_str(),
                &filename,
                display_name,
                &storage_key,
            )
            .await?;

        Ok(PresignGrant {
            presigned_url,
            storage_key,
            artifact_id: row.id,
        })
    }

    pub async fn confirm_installer(
        &self,
        app_id: &str,
        release_id: &str,
        installer_id: &str,
        checksum: Option<&str>,
    ) -> Result<InstallerRow, ApiError> {
        self.load_release(app_id, release_id).await?;
        let row = self
            .installers
            .require_in_release(release_id, installer_id)
            .await?;

        let Some(storage_key) = row.storage_key.as_deref().filter(|_| row.is_pending()) else {
            return Err(ApiError::NotPending);
        };
        if let Some(checksum) = checksum {
            validate_checksum(checksum)?;
        }

        if !self.store.exists(storage_key).await? {
            return Err(ApiError::NotFoundInStorage);
        }
        let meta = self.store.head(storage_key).await?;
        let download_url = self.resolve_download_url(storage_key).await?;

        self.installers
            .confirm(installer_id, &download_url, meta.size, checksum)
            .await
    }

    pub async fn create_direct_installer(
        &self,
        app_id: &str,
        release_id: &str,
        platform: &str,
        filename: &str,
        display_name: Option<&str>,
        download_url: &str,
        file_size: Option<i64>,
    ) -> Result<InstallerRow, ApiError> {
        self.load_release(app_id, release_id).await?;
        let platform = normalize_installer_platform(platform)?;
        let filename = sanitize_filename(filename)?;
        validate_download_url(download_url)?;
        self.installers
            .insert_direct(
                release_id,
                platform.as_str(),
                &filename,
                display_name,
                download_url,
                file_size,
            )
            .await
    }

    pub async fn delete_installer(
        &self,
        app_id: &str,
        release_id: &str,
        installer_id: &str,
    ) -> Result<(), ApiError> {
        self.load_release(app_id, release_id).await?;
        let row = self
            .installers
            .require_in_release(release_id, installer_id)
            .await?;
        self.installers.delete(&row.id).await?;
        if let Some(key) = &row.storage_key {
            self.delete_object_best_effort(key).await;
        }
        Ok(())
    }

    pub async fn link_uploaded_installer(
        &self,
        release: &ReleaseRow,
        platform: &str,
        storage_key: &str,
        filename: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<InstallerRow, ApiError> {
        let platform = normalize_installer_platform(platform)?;
        // Default the filename to the object's basename.
        let fallback = storage_key.rsplit('/').next().unwrap_or(storage_key);
        let filename = sanitize_filename(filename.unwrap_or(fallback))?;

        let meta = match self.store.head(storage_key).await {
            Ok(meta) => meta,
            Err(crate::object_store::StoreError::NotFound(_)) => {
                return Err(ApiError::NotFoundInStorage)
            }
            Err(e) => return Err(e.into()),
        };
        let download_url = self.resolve_download_url(storage_key).await?;
        self.installers
            .insert_confirmed(
                &release.id,
                platform.as_str(),
                &filename,
                display_name,
                storage_key,
                &download_url,
                Some(meta.size),
            )
            .await
    }
}

fn validate_download_url(url: &str) -> Result<(), ApiError> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ApiError::validation(format!(
            "download_url '{url}' must be an http(s) URL"
        )));
    }
    Ok(())
}
