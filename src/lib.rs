pub mod analytics;
pub mod auth;
pub mod config;
pub mod crashes;
pub mod error;
pub mod ids;
pub mod object_store;
pub mod platform;
pub mod resolver;
pub mod rest;
pub mod storage;
pub mod uploads;
pub mod validate;

use std::sync::Arc;

use analytics::DownloadRecorder;
use auth::KeyService;
use config::OasisConfig;
use crashes::CrashService;
use object_store::ObjectStore;
use resolver::UpdateResolver;
use storage::apps::AppStore;
use storage::artifacts::{ArtifactStore, InstallerStore};
use storage::crashes::CrashStore;
use storage::feedback::FeedbackStore;
use storage::keys::KeyStore;
use storage::releases::ReleaseStore;
use storage::Storage;
use uploads::UploadManager;

/// Shared application state handed to every request handler.
pub struct AppContext {
    pub config: Arc<OasisConfig>,
    pub storage: Storage,
    pub apps: AppStore,
    pub releases: ReleaseStore,
    pub artifacts: ArtifactStore,
    pub installers: InstallerStore,
    pub keys: KeyService,
    pub uploads: UploadManager,
    pub resolver: UpdateResolver,
    pub crashes: CrashService,
    pub feedback: FeedbackStore,
    pub object_store: Arc<dyn ObjectStore>,
    pub started_at: std::time::Instant,
}

/// Wire the context from configuration: open the database, build the
/// object-store gateway, and hand out pool clones to every store.
pub async fn build_context(config: OasisConfig) -> anyhow::Result<Arc<AppContext>> {
    let storage = Storage::new(&config.data_dir).await?;
    let store = object_store::from_config(&config.storage).await;
    Ok(build_context_with(config, storage, store))
}

/// Same wiring with pre-built storage and gateway. Tests inject the
/// in-memory object store here.
pub fn build_context_with(
    config: OasisConfig,
    storage: Storage,
    store: Arc<dyn ObjectStore>,
) -> Arc<AppContext> {
    let pool = storage.pool();

    let apps = AppStore::new(pool.clone());
    let releases = ReleaseStore::new(pool.clone());
    let artifacts = ArtifactStore::new(pool.clone());
    let installers = InstallerStore::new(pool.clone());
    let keys = KeyService::new(KeyStore::new(pool.clone()));
    let analytics = DownloadRecorder::new(pool.clone());
    let uploads = UploadManager::new(
        apps.clone(),
        releases.clone(),
        artifacts.clone(),
        installers.clone(),
        store.clone(),
    );
    let resolver = UpdateResolver::new(
        apps.clone(),
        releases.clone(),
        artifacts.clone(),
        installers.clone(),
        analytics.clone(),
    );
    let crashes = CrashService::new(CrashStore::new(pool.clone()));
    let feedback = FeedbackStore::new(pool);

    Arc::new(AppContext {
        config: Arc::new(config),
        storage,
        apps,
        releases,
        artifacts,
        installers,
        keys,
        uploads,
        resolver,
        crashes,
        feedback,
        object_store: store,
        started_at: std::time::Instant::now(),
    })
}
