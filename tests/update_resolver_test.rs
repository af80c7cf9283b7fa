//! Update resolution end-to-end: manifests, 204s, signed-app enforcement,
//! target aliases, and installer downloads.

mod common;

use serde_json::json;

/// App + published 1.0.0 release with a confirmed darwin-aarch64 artifact.
async fn published_fixture(srv: &common::TestServer, signature: Option<&str>) -> (String, String) {
    let app = srv.create_app("note", "Note").await;
    let app_id = app["id"].as_str().unwrap().to_string();
    let release = srv.create_release(&app_id, "1.0.0").await;
    let release_id = release["id"].as_str().unwrap().to_string();
    srv.upload_artifact(
        &app_id,
        &release_id,
        "darwin-aarch64",
        "note_1.0.0.tar.gz",
        b"app-bytes",
        signature,
    )
    .await;
    srv.publish_release(&app_id, &release_id).await;
    (app_id, release_id)
}

#[tokio::test]
async fn older_client_gets_a_manifest() {
    let srv = common::spawn().await;
    published_fixture(&srv, None).await;

    let res = srv.get_public("/note/update/darwin-aarch64/0.9.0").await;
    assert_eq!(res.status(), 200);
    let manifest: serde_json::Value = res.json().await.unwrap();
    assert_eq!(manifest["version"], "1.0.0");
    assert!(manifest["url"].as_str().unwrap().contains("note_1.0.0.tar.gz"));
    assert!(manifest["pub_date"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn current_client_gets_204() {
    let srv = common::spawn().await;
    published_fixture(&srv, None).await;

    let res = srv.get_public("/note/update/darwin-aarch64/1.0.0").await;
    assert_eq!(res.status(), 204);
    assert!(res.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn no_published_release_means_204() {
    let srv = common::spawn().await;
    srv.create_app("note", "Note").await;

    let res = srv.get_public("/note/update/darwin-aarch64/0.0.0").await;
    assert_eq!(res.status(), 204);
}

#[tokio::test]
async fn unknown_app_is_404_and_bad_inputs_are_400() {
    let srv = common::spawn().await;
    published_fixture(&srv, None).await;

    let res = srv.get_public("/ghost/update/darwin-aarch64/1.0.0").await;
    assert_eq!(res.status(), 404);

    let res = srv.get_public("/note/update/darwin-aarch64/not-semver").await;
    assert_eq!(res.status(), 400);

    let res = srv.get_public("/note/update/beos-ppc/1.0.0").await;
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn aliases_and_os_arch_form_resolve() {
    let srv = common::spawn().await;
    published_fixture(&srv, None).await;

    // Alias in single-target form.
    let res = srv.get_public("/note/update/macos-aarch64/0.9.0").await;
    assert_eq!(res.status(), 200);

    // Two-segment os/arch form.
    let res = srv.get_public("/note/update/darwin/aarch64/0.9.0").await;
    assert_eq!(res.status(), 200);

    let res = srv.get_public("/note/update/macos/aarch64/0.9.0").await;
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn missing_platform_artifact_is_204() {
    let srv = common::spawn().await;
    published_fixture(&srv, None).await;

    let res = srv.get_public("/note/update/windows-x86_64/0.9.0").await;
    assert_eq!(res.status(), 204);
}

#[tokio::test]
async fn signed_app_refuses_unsigned_artifacts() {
    let srv = common::spawn().await;
    let app = srv.create_app("note", "Note").await;
    let app_id = app["id"].as_str().unwrap().to_string();

    // Turn on signed updates. (Any opaque key works; enforcement is on
    // presence.)
    let res = srv
        .patch(
            &format!("/admin/apps/{app_id}"),
            json!({ "public_key": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=" }),
        )
        .await;
    assert_eq!(res.status(), 200);

    let release = srv.create_release(&app_id, "1.0.0").await;
    let release_id = release["id"].as_str().unwrap().to_string();
    srv.upload_artifact(&app_id, &release_id, "darwin-aarch64", "a.tar.gz", b"x", None)
        .await;
    srv.publish_release(&app_id, &release_id).await;

    // Unsigned artifact on a signed-updates app: refuse to serve.
    let res = srv.get_public("/note/update/darwin-aarch64/0.9.0").await;
    assert_eq!(res.status(), 204);

    // A signed release is served.
    let release = srv.create_release(&app_id, "1.1.0").await;
    let release_id = release["id"].as_str().unwrap().to_string();
    srv.upload_artifact(
        &app_id,
        &release_id,
        "darwin-aarch64",
        "b.tar.gz",
        b"y",
        Some("c2lnbmF0dXJl"),
    )
    .await;
    srv.publish_release(&app_id, &release_id).await;

    let res = srv.get_public("/note/update/darwin-aarch64/0.9.0").await;
    assert_eq!(res.status(), 200);
    let manifest: serde_json::Value = res.json().await.unwrap();
    assert_eq!(manifest["version"], "1.1.0");
    assert_eq!(manifest["signature"], "c2lnbmF0dXJl");
}

#[tokio::test]
async fn archived_releases_are_invisible() {
    let srv = common::spawn().await;
    let (app_id, release_id) = published_fixture(&srv, None).await;

    srv.post_empty(&format!("/admin/apps/{app_id}/releases/{release_id}/archive"))
        .await;

    let res = srv.get_public("/note/update/darwin-aarch64/0.9.0").await;
    assert_eq!(res.status(), 204);
}

#[tokio::test]
async fn later_published_lower_semver_does_not_win() {
    let srv = common::spawn().await;
    let (app_id, _) = published_fixture(&srv, None).await;

    // Publish 0.9.5 after 1.0.0 — allowed, but never the winner.
    let release = srv.create_release(&app_id, "0.9.5").await;
    let release_id = release["id"].as_str().unwrap().to_string();
    srv.upload_artifact(&app_id, &release_id, "darwin-aarch64", "old.tar.gz", b"o", None)
        .await;
    srv.publish_release(&app_id, &release_id).await;

    let res = srv.get_public("/note/update/darwin-aarch64/0.9.0").await;
    assert_eq!(res.status(), 200);
    let manifest: serde_json::Value = res.json().await.unwrap();
    assert_eq!(manifest["version"], "1.0.0");
}

#[tokio::test]
async fn prerelease_clients_update_to_the_core_release() {
    let srv = common::spawn().await;
    published_fixture(&srv, None).await;

    let res = srv
        .get_public("/note/update/darwin-aarch64/1.0.0-beta.3")
        .await;
    assert_eq!(res.status(), 200);

    let res = srv.get_public("/note/update/darwin-aarch64/1.0.1-beta.1").await;
    assert_eq!(res.status(), 204);
}

// ─── Installer downloads ──────────────────────────────────────────────────────

async fn installer_fixture(srv: &common::TestServer) -> (String, String) {
    let app = srv.create_app("note", "Note").await;
    let app_id = app["id"].as_str().unwrap().to_string();
    let release = srv.create_release(&app_id, "1.0.0").await;
    let release_id = release["id"].as_str().unwrap().to_string();

    let res = srv
        .post(
            &format!("/admin/apps/{app_id}/releases/{release_id}/installers/presign"),
            json!({ "platform": "darwin-universal", "filename": "Note.dmg" }),
        )
        .await;
    let grant: serde_json::Value = res.json().await.unwrap();
    srv.store
        .put(grant["storage_key"].as_str().unwrap(), vec![1u8; 64])
        .await;
    srv.post(
        &format!(
            "/admin/apps/{app_id}/releases/{release_id}/installers/{}/confirm",
            grant["installer_id"].as_str().unwrap()
        ),
        json!({}),
    )
    .await;

    srv.publish_release(&app_id, &release_id).await;
    (app_id, release_id)
}

#[tokio::test]
async fn download_redirects_to_the_installer() {
    let srv = common::spawn().await;
    installer_fixture(&srv).await;

    let res = srv.get_public("/note/download/darwin-universal").await;
    assert_eq!(res.status(), 302);
    let location = res.headers()["location"].to_str().unwrap();
    assert!(location.contains("Note.dmg"));
}

#[tokio::test]
async fn download_falls_back_across_platforms() {
    let srv = common::spawn().await;
    installer_fixture(&srv).await;

    // darwin-aarch64 has no installer of its own; the universal bundle wins.
    let res = srv.get_public("/note/download/darwin-aarch64").await;
    assert_eq!(res.status(), 302);

    // Linux has no fallback here.
    let res = srv.get_public("/note/download/linux-x86_64").await;
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn download_descriptor_as_json() {
    let srv = common::spawn().await;
    installer_fixture(&srv).await;

    let res = srv
        .get_public("/note/download/darwin-universal?format=json")
        .await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["platform"], "darwin-universal");
    assert_eq!(body["filename"], "Note.dmg");
    assert_eq!(body["version"], "1.0.0");
    assert_eq!(body["file_size"], 64);
    assert!(body["download_url"].as_str().unwrap().contains("Note.dmg"));
    assert!(body["published_at"].as_str().is_some());
}

#[tokio::test]
async fn versioned_download_requires_a_published_release() {
    let srv = common::spawn().await;
    let (app_id, _) = installer_fixture(&srv).await;

    let res = srv.get_public("/note/download/darwin-universal/1.0.0").await;
    assert_eq!(res.status(), 302);

    // Draft 2.0.0 is not downloadable.
    srv.create_release(&app_id, "2.0.0").await;
    let res = srv.get_public("/note/download/darwin-universal/2.0.0").await;
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn public_base_url_produces_stable_urls() {
    let srv = common::spawn_with_public_base(Some("https://cdn.example.com")).await;
    let app = srv.create_app("note", "Note").await;
    let app_id = app["id"].as_str().unwrap().to_string();
    let release = srv.create_release(&app_id, "1.0.0").await;
    let release_id = release["id"].as_str().unwrap().to_string();
    let artifact = srv
        .upload_artifact(&app_id, &release_id, "darwin-aarch64", "n.tar.gz", b"x", None)
        .await;

    assert_eq!(
        artifact["download_url"],
        "https://cdn.example.com/note/releases/1.0.0/n.tar.gz"
    );
}
