//! Shared test harness: boots the full API on a random port with an
//! in-memory object store, and mints a bootstrap admin key.

use std::sync::Arc;

use oasis::auth::KeyScope;
use oasis::config::OasisConfig;
use oasis::object_store::memory::MemoryObjectStore;
use oasis::object_store::ObjectStore;
use oasis::storage::Storage;
use oasis::AppContext;
use serde_json::Value;
use tempfile::TempDir;

pub struct TestServer {
    pub base: String,
    pub ctx: Arc<AppContext>,
    pub store: Arc<MemoryObjectStore>,
    pub admin_key: String,
    pub client: reqwest::Client,
    _dir: TempDir,
}

/// Boot a server with no public base URL (confirmations fall back to signed
/// GET URLs).
pub async fn spawn() -> TestServer {
    spawn_with_public_base(None).await
}

pub async fn spawn_with_public_base(public_base_url: Option<&str>) -> TestServer {
    let dir = TempDir::new().unwrap();
    let config = OasisConfig::new(Some(0), Some(dir.path().to_path_buf()), Some("error".into()));

    let storage = Storage::new(dir.path()).await.unwrap();
    let store = Arc::new(MemoryObjectStore::new(
        public_base_url.map(str::to_string),
    ));
    let ctx = oasis::build_context_with(
        config,
        storage,
        store.clone() as Arc<dyn ObjectStore>,
    );

    let (admin_key, _) = ctx
        .keys
        .create_bearer_key("test-admin", KeyScope::Admin, None)
        .await
        .unwrap();

    let router = oasis::rest::build_router(ctx.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        ctx,
        store,
        admin_key,
        client: reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap(),
        _dir: dir,
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    // ─── Raw requests with the admin bearer key ──────────────────────────────

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(&self.admin_key)
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(&self.admin_key)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn post_empty(&self, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(&self.admin_key)
            .send()
            .await
            .unwrap()
    }

    pub async fn patch(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .bearer_auth(&self.admin_key)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(&self.admin_key)
            .send()
            .await
            .unwrap()
    }

    /// Unauthenticated GET (public surfaces).
    pub async fn get_public(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    // ─── Fixtures ────────────────────────────────────────────────────────────

    pub async fn create_app(&self, slug: &str, name: &str) -> Value {
        let res = self
            .post("/admin/apps", serde_json::json!({ "slug": slug, "name": name }))
            .await;
        assert_eq!(res.status(), 201, "create_app failed");
        res.json().await.unwrap()
    }

    pub async fn create_release(&self, app_id: &str, version: &str) -> Value {
        let res = self
            .post(
                &format!("/admin/apps/{app_id}/releases"),
                serde_json::json!({ "version": version }),
            )
            .await;
        assert_eq!(res.status(), 201, "create_release failed");
        res.json().await.unwrap()
    }

    pub async fn publish_release(&self, app_id: &str, release_id: &str) -> Value {
        let res = self
            .post_empty(&format!("/admin/apps/{app_id}/releases/{release_id}/publish"))
            .await;
        assert_eq!(res.status(), 200, "publish_release failed");
        res.json().await.unwrap()
    }

    /// Full two-phase upload: presign, simulate the client PUT against the
    /// in-memory store, confirm. Returns the confirmed artifact JSON.
    pub async fn upload_artifact(
        &self,
        app_id: &str,
        release_id: &str,
        platform: &str,
        filename: &str,
        bytes: &[u8],
        signature: Option<&str>,
    ) -> Value {
        let res = self
            .post(
                &format!("/admin/apps/{app_id}/releases/{release_id}/artifacts/presign"),
                serde_json::json!({ "platform": platform, "filename": filename }),
            )
            .await;
        assert_eq!(res.status(), 201, "presign failed");
        let grant: Value = res.json().await.unwrap();
        let storage_key = grant["storage_key"].as_str().unwrap();
        let artifact_id = grant["artifact_id"].as_str().unwrap();

        self.store.put(storage_key, bytes.to_vec()).await;

        let mut confirm = serde_json::Map::new();
        if let Some(sig) = signature {
            confirm.insert("signature".into(), Value::String(sig.into()));
        }
        let res = self
            .post(
                &format!(
                    "/admin/apps/{app_id}/releases/{release_id}/artifacts/{artifact_id}/confirm"
                ),
                Value::Object(confirm),
            )
            .await;
        assert_eq!(res.status(), 200, "confirm failed");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["confirmed"], true);
        body["artifact"].clone()
    }

    /// Mint an SDK key for an app and return the plaintext.
    pub async fn create_sdk_key(&self, app_id: &str) -> String {
        let res = self
            .post(
                &format!("/admin/apps/{app_id}/keys"),
                serde_json::json!({ "name": "test-sdk" }),
            )
            .await;
        assert_eq!(res.status(), 201, "create_sdk_key failed");
        let body: Value = res.json().await.unwrap();
        body["key"].as_str().unwrap().to_string()
    }
}

/// Extract the machine-readable error code from an error body.
pub async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}
