//! Update resolution — the read path clients hit on every launch.
//!
//! `(slug, target, current_version)` → signed manifest or "no update".
//! Archived releases are invisible, pending artifacts are invisible, and an
//! app with a verification key never serves an unsigned artifact.

use semver::Version;
use serde::Serialize;
use tracing::warn;

use crate::analytics::DownloadRecorder;
use crate::error::ApiError;
use crate::ids::rfc3339_ms;
use crate::platform::{normalize_installer_platform, normalize_target};
use crate::storage::apps::{AppRow, AppStore};
use crate::storage::artifacts::{ArtifactStore, InstallerRow, InstallerStore};
use crate::storage::releases::{ReleaseRow, ReleaseStore};
use crate::validate::parse_version;

/// Tauri-compatible update manifest (200 body).
#[derive(Debug, Clone, Serialize)]
pub struct UpdateManifest {
    pub version: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A resolved installer download plus the release it came from.
#[derive(Debug, Clone)]
pub struct ResolvedInstaller {
    pub app: AppRow,
    pub release: ReleaseRow,
    pub installer: InstallerRow,
    pub download_url: String,
}

#[derive(Clone)]
pub struct UpdateResolver {
    apps: AppStore,
    releases: ReleaseStore,
    artifacts: ArtifactStore,
    installers: InstallerStore,
    analytics: DownloadRecorder,
}

impl UpdateResolver {
    pub fn new(
        apps: AppStore,
        releases: ReleaseStore,
        artifacts: ArtifactStore,
        installers: InstallerStore,
        analytics: DownloadRecorder,
    ) -> Self {
        Self {
            apps,
            releases,
            artifacts,
            installers,
            analytics,
        }
    }

    /// Core algorithm. `Ok(None)` means "no update" (HTTP 204).
    pub async fn check_update(
        &self,
        slug: &str,
        target: &str,
        current_version: &str,
    ) -> Result<Option<UpdateManifest>, ApiError> {
        let app = self.apps.require_by_slug(slug).await?;
        let platform = normalize_target(target)?;
        let current = parse_version(current_version)?;

        let published = self.releases.list_published(&app.id).await?;
        let Some((winner, winner_version)) = pick_winner(&published, &current) else {
            return Ok(None);
        };

        let Some(artifact) = self
            .artifacts
            .get_by_platform(&winner.id, platform.as_str())
            .await?
        else {
            return Ok(None);
        };
        // Pending and never-confirmed rows are not served.
        let Some(url) = artifact.download_url.clone() else {
            return Ok(None);
        };
        // A signed-updates app must never downgrade a client to an unsigned
        // artifact.
        if app.public_key.is_some() && artifact.signature.is_none() {
            warn!(
                app = %app.slug,
                version = %winner_version,
                platform = %platform,
                "refusing to serve unsigned artifact for signed-updates app"
            );
            return Ok(None);
        }

        self.analytics
            .record_update(&app.id, &artifact.id, platform.as_str(), &winner.version);

        Ok(Some(UpdateManifest {
            version: winner.version.clone(),
            url,
            notes: winner.notes.clone(),
            pub_date: winner.pub_date.map(rfc3339_ms),
            signature: artifact.signature.clone(),
        }))
    }

    /// Installer download resolution with the closed platform fallback table.
    pub async fn resolve_installer(
        &self,
        slug: &str,
        platform: &str,
        version: Option<&str>,
    ) -> Result<ResolvedInstaller, ApiError> {
        let app = self.apps.require_by_slug(slug).await?;
        let platform = normalize_installer_platform(platform)?;

        let release = match version {
            Some(version) => {
                parse_version(version)?;
                let release = self
                    .releases
                    .get_by_version(&app.id, version)
                    .await?
                    .filter(|r| r.status == crate::storage::releases::STATUS_PUBLISHED);
                release.ok_or_else(|| {
                    ApiError::not_found(format!("published release '{version}'"))
                })?
            }
            None => {
                let published = self.releases.list_published(&app.id).await?;
                latest_published(&published)
                    .ok_or_else(|| ApiError::not_found("published release"))?
                    .clone()
            }
        };

        for candidate in platform.fallback_chain() {
            let Some(installer) = self
                .installers
                .get_by_platform(&release.id, candidate.as_str())
                .await?
            else {
                continue;
            };
            let Some(url) = installer.download_url.clone() else {
                continue;
            };
            self.analytics.record_installer(
                &app.id,
                &installer.id,
                candidate.as_str(),
                &release.version,
            );
            return Ok(ResolvedInstaller {
                app,
                release,
                installer,
                download_url: url,
            });
        }

        Err(ApiError::not_found(format!(
            "installer for platform '{platform}'"
        )))
    }
}

/// Strictly-newer-than-current winner: highest semver, ties broken by
/// pub_date desc then id desc.
fn pick_winner<'a>(
    published: &'a [ReleaseRow],
    current: &Version,
) -> Option<(&'a ReleaseRow, Version)> {
    let mut winner: Option<(&ReleaseRow, Version)> = None;
    for release in published {
        let version = match Version::parse(&release.version) {
            Ok(v) => v,
            Err(e) => {
                // Versions are validated at creation; tolerate legacy rows.
                warn!(release = %release.id, err = %e, "skipping release with unparsable version");
                continue;
            }
        };
        if version <= *current {
            continue;
        }
        let better = match &winner {
            None => true,
            Some((best, best_version)) => {
                match version.cmp(best_version) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Equal => (release.pub_date, release.id.as_str())
                        > (best.pub_date, best.id.as_str()),
                }
            }
        };
        if better {
            winner = Some((release, version));
        }
    }
    winner
}

/// Latest published release: highest semver, pub_date desc on ties.
fn latest_published(published: &[ReleaseRow]) -> Option<&ReleaseRow> {
    // Version 0.0.0 never filters anything out.
    pick_winner(published, &Version::new(0, 0, 0))
        .map(|(release, _)| release)
        .or_else(|| {
            // All published versions are ≤ 0.0.0 (only possible with
            // pre-releases of 0.0.0); fall back to pub_date ordering.
            published.iter().max_by_key(|r| (r.pub_date, r.id.clone()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(id: &str, version: &str, pub_date: i64) -> ReleaseRow {
        ReleaseRow {
            id: id.to_string(),
            app_id: "app".to_string(),
            version: version.to_string(),
            notes: None,
            status: "published".to_string(),
            pub_date: Some(pub_date),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn picks_highest_strictly_newer() {
        let rows = vec![
            release("r1", "1.0.0", 100),
            release("r2", "1.2.0", 200),
            release("r3", "1.1.0", 300),
        ];
        let current = Version::parse("1.0.0").unwrap();
        let (winner, _) = pick_winner(&rows, &current).unwrap();
        assert_eq!(winner.version, "1.2.0");
    }

    #[test]
    fn equal_version_is_not_an_update() {
        let rows = vec![release("r1", "1.0.0", 100)];
        let current = Version::parse("1.0.0").unwrap();
        assert!(pick_winner(&rows, &current).is_none());
    }

    #[test]
    fn prerelease_sorts_below_core() {
        let rows = vec![release("r1", "1.1.0-beta.1", 100)];
        // 1.1.0-beta.1 is newer than 1.0.0…
        assert!(pick_winner(&rows, &Version::parse("1.0.0").unwrap()).is_some());
        // …but older than released 1.1.0.
        assert!(pick_winner(&rows, &Version::parse("1.1.0").unwrap()).is_none());
    }

    #[test]
    fn lower_semver_published_later_does_not_win() {
        let rows = vec![
            release("r1", "2.0.0", 100),
            release("r2", "1.5.0", 900),
        ];
        let current = Version::parse("1.0.0").unwrap();
        let (winner, _) = pick_winner(&rows, &current).unwrap();
        assert_eq!(winner.version, "2.0.0");
    }

    #[test]
    fn pub_date_breaks_version_ties() {
        // Same semver twice cannot exist within one app, but can across
        // rebuild rows migrated from older deployments.
        let rows = vec![
            release("r1", "1.1.0+build.1", 100),
            release("r2", "1.1.0+build.2", 200),
        ];
        let current = Version::parse("1.0.0").unwrap();
        let (winner, _) = pick_winner(&rows, &current).unwrap();
        // Build metadata is ignored for ordering; later pub_date wins.
        assert_eq!(winner.id, "r2");
    }

    #[test]
    fn latest_published_prefers_semver() {
        let rows = vec![
            release("r1", "1.0.0", 900),
            release("r2", "2.0.0", 100),
        ];
        assert_eq!(latest_published(&rows).unwrap().version, "2.0.0");
        assert!(latest_published(&[]).is_none());
    }
}
