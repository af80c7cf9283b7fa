//! Two-phase upload protocol: presign, confirm, replace, delete, direct.

mod common;

use oasis::object_store::ObjectStore;
use serde_json::json;

async fn fixture(srv: &common::TestServer) -> (String, String) {
    let app = srv.create_app("note", "Note").await;
    let app_id = app["id"].as_str().unwrap().to_string();
    let release = srv.create_release(&app_id, "1.0.0").await;
    (app_id, release["id"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn presign_then_confirm_round_trip() {
    let srv = common::spawn().await;
    let (app_id, release_id) = fixture(&srv).await;

    let artifact = srv
        .upload_artifact(
            &app_id,
            &release_id,
            "darwin-aarch64",
            "note_1.0.0.tar.gz",
            b"artifact-bytes",
            None,
        )
        .await;

    assert_eq!(artifact["state"], "confirmed");
    assert_eq!(artifact["platform"], "darwin-aarch64");
    assert_eq!(
        artifact["storage_key"],
        "note/releases/1.0.0/note_1.0.0.tar.gz"
    );
    assert_eq!(artifact["file_size"], 14);
    assert!(artifact["download_url"].as_str().unwrap().contains("note_1.0.0.tar.gz"));
}

#[tokio::test]
async fn second_presign_without_replace_conflicts() {
    let srv = common::spawn().await;
    let (app_id, release_id) = fixture(&srv).await;
    let path = format!("/admin/apps/{app_id}/releases/{release_id}/artifacts/presign");

    let res = srv
        .post(
            &path,
            json!({ "platform": "windows-x86_64", "filename": "note.msi" }),
        )
        .await;
    assert_eq!(res.status(), 201);

    let res = srv
        .post(
            &path,
            json!({ "platform": "windows-x86_64", "filename": "note.msi" }),
        )
        .await;
    assert_eq!(res.status(), 409);

    // replace_existing discards the pending slot and succeeds.
    let res = srv
        .post(
            &path,
            json!({
                "platform": "windows-x86_64",
                "filename": "note.msi",
                "replace_existing": true
            }),
        )
        .await;
    assert_eq!(res.status(), 201);
}

#[tokio::test]
async fn confirm_before_upload_reports_missing_object() {
    let srv = common::spawn().await;
    let (app_id, release_id) = fixture(&srv).await;

    let res = srv
        .post(
            &format!("/admin/apps/{app_id}/releases/{release_id}/artifacts/presign"),
            json!({ "platform": "linux-x86_64", "filename": "note.AppImage" }),
        )
        .await;
    let grant: serde_json::Value = res.json().await.unwrap();
    let artifact_id = grant["artifact_id"].as_str().unwrap();

    // No PUT happened; the object is absent.
    let res = srv
        .post(
            &format!("/admin/apps/{app_id}/releases/{release_id}/artifacts/{artifact_id}/confirm"),
            json!({}),
        )
        .await;
    assert_eq!(res.status(), 404);
    assert_eq!(common::error_code(res).await, "not_found_in_storage");
}

#[tokio::test]
async fn double_confirm_reports_not_pending() {
    let srv = common::spawn().await;
    let (app_id, release_id) = fixture(&srv).await;

    let artifact = srv
        .upload_artifact(
            &app_id,
            &release_id,
            "darwin-x86_64",
            "note.tar.gz",
            b"bytes",
            None,
        )
        .await;
    let artifact_id = artifact["id"].as_str().unwrap();

    let res = srv
        .post(
            &format!("/admin/apps/{app_id}/releases/{release_id}/artifacts/{artifact_id}/confirm"),
            json!({}),
        )
        .await;
    assert_eq!(res.status(), 409);
    assert_eq!(common::error_code(res).await, "not_pending");
}

#[tokio::test]
async fn delete_frees_the_slot_and_the_object() {
    let srv = common::spawn().await;
    let (app_id, release_id) = fixture(&srv).await;

    let artifact = srv
        .upload_artifact(
            &app_id,
            &release_id,
            "darwin-aarch64",
            "note.tar.gz",
            b"v1",
            None,
        )
        .await;
    let artifact_id = artifact["id"].as_str().unwrap();
    let storage_key = artifact["storage_key"].as_str().unwrap().to_string();
    assert!(srv.store.exists(&storage_key).await.unwrap());

    let res = srv
        .delete(&format!(
            "/admin/apps/{app_id}/releases/{release_id}/artifacts/{artifact_id}"
        ))
        .await;
    assert_eq!(res.status(), 204);
    assert!(!srv.store.exists(&storage_key).await.unwrap());

    // The slot is free again without replace_existing.
    let res = srv
        .post(
            &format!("/admin/apps/{app_id}/releases/{release_id}/artifacts/presign"),
            json!({ "platform": "darwin-aarch64", "filename": "note.tar.gz" }),
        )
        .await;
    assert_eq!(res.status(), 201);
}

#[tokio::test]
async fn direct_artifacts_skip_the_protocol() {
    let srv = common::spawn().await;
    let (app_id, release_id) = fixture(&srv).await;

    let res = srv
        .post(
            &format!("/admin/apps/{app_id}/releases/{release_id}/artifacts"),
            json!({
                "platform": "linux-x86_64",
                "download_url": "https://downloads.example.com/note_1.0.0.AppImage",
                "signature": "c2ln",
            }),
        )
        .await;
    assert_eq!(res.status(), 201);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["state"], "direct");
    assert!(body["storage_key"].is_null());

    // Confirm is meaningless for a direct artifact.
    let res = srv
        .post(
            &format!(
                "/admin/apps/{app_id}/releases/{release_id}/artifacts/{}/confirm",
                body["id"].as_str().unwrap()
            ),
            json!({}),
        )
        .await;
    assert_eq!(res.status(), 409);
}

#[tokio::test]
async fn bad_inputs_are_rejected() {
    let srv = common::spawn().await;
    let (app_id, release_id) = fixture(&srv).await;
    let path = format!("/admin/apps/{app_id}/releases/{release_id}/artifacts/presign");

    // Unknown platform.
    let res = srv
        .post(&path, json!({ "platform": "beos-ppc", "filename": "x.tar.gz" }))
        .await;
    assert_eq!(res.status(), 400);

    // Installer-only platform is not a valid artifact target.
    let res = srv
        .post(
            &path,
            json!({ "platform": "darwin-universal", "filename": "x.tar.gz" }),
        )
        .await;
    assert_eq!(res.status(), 400);

    // Hostile filename.
    let res = srv
        .post(
            &path,
            json!({ "platform": "linux-x86_64", "filename": "a b?.tar.gz" }),
        )
        .await;
    assert_eq!(res.status(), 400);

    // Path components are stripped, not rejected.
    let res = srv
        .post(
            &path,
            json!({ "platform": "linux-x86_64", "filename": "/tmp/build/note.tar.gz" }),
        )
        .await;
    assert_eq!(res.status(), 201);
    let grant: serde_json::Value = res.json().await.unwrap();
    assert_eq!(grant["storage_key"], "note/releases/1.0.0/note.tar.gz");
}

#[tokio::test]
async fn installer_two_phase_mirrors_artifacts() {
    let srv = common::spawn().await;
    let (app_id, release_id) = fixture(&srv).await;

    let res = srv
        .post(
            &format!("/admin/apps/{app_id}/releases/{release_id}/installers/presign"),
            json!({
                "platform": "darwin-universal",
                "filename": "Note-1.0.0.dmg",
                "display_name": "Note for macOS"
            }),
        )
        .await;
    assert_eq!(res.status(), 201);
    let grant: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        grant["storage_key"],
        "note/installers/1.0.0/Note-1.0.0.dmg"
    );
    let installer_id = grant["installer_id"].as_str().unwrap();

    srv.store
        .put(grant["storage_key"].as_str().unwrap(), vec![0u8; 2048])
        .await;

    let res = srv
        .post(
            &format!(
                "/admin/apps/{app_id}/releases/{release_id}/installers/{installer_id}/confirm"
            ),
            json!({ "checksum": "sha256:00ff" }),
        )
        .await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["installer"]["state"], "confirmed");
    assert_eq!(body["installer"]["file_size"], 2048);
    assert_eq!(body["installer"]["display_name"], "Note for macOS");
}
