//! CI one-shot releases: pre-uploaded objects linked as confirmed artifacts.

mod common;

use oasis::auth::KeyScope;
use serde_json::json;

#[tokio::test]
async fn one_shot_release_with_auto_publish() {
    let srv = common::spawn().await;
    let app = srv.create_app("note", "Note").await;

    // The pipeline uploaded these itself before calling us.
    srv.store
        .put("note/releases/1.2.0/note_aarch64.tar.gz", vec![0u8; 100])
        .await;
    srv.store
        .put("note/releases/1.2.0/note_x64.tar.gz", vec![0u8; 200])
        .await;
    srv.store
        .put("note/installers/1.2.0/Note-1.2.0.dmg", vec![0u8; 300])
        .await;

    let res = srv
        .post(
            "/ci/apps/note/releases",
            json!({
                "version": "1.2.0",
                "notes": "automated release",
                "artifacts": [
                    {
                        "platform": "darwin-aarch64",
                        "signature": "c2ln",
                        "r2_key": "note/releases/1.2.0/note_aarch64.tar.gz"
                    },
                    {
                        "platform": "darwin-x86_64",
                        "signature": "c2ln",
                        "r2_key": "note/releases/1.2.0/note_x64.tar.gz"
                    }
                ],
                "installers": [
                    {
                        "platform": "darwin-universal",
                        "r2_key": "note/installers/1.2.0/Note-1.2.0.dmg"
                    }
                ],
                "auto_publish": true
            }),
        )
        .await;
    assert_eq!(res.status(), 201);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["release"]["status"], "published");
    assert_eq!(body["artifacts"].as_array().unwrap().len(), 2);
    assert_eq!(body["artifacts"][0]["state"], "confirmed");
    assert_eq!(body["artifacts"][0]["file_size"], 100);
    assert_eq!(body["installers"][0]["filename"], "Note-1.2.0.dmg");

    // Clients see the release immediately.
    let res = srv.get_public("/note/update/darwin-aarch64/1.0.0").await;
    assert_eq!(res.status(), 200);
    let manifest: serde_json::Value = res.json().await.unwrap();
    assert_eq!(manifest["version"], "1.2.0");
    assert_eq!(manifest["notes"], "automated release");

    let res = srv.get_public("/note/download/darwin-universal").await;
    assert_eq!(res.status(), 302);

    let _ = app;
}

#[tokio::test]
async fn missing_object_fails_the_link() {
    let srv = common::spawn().await;
    srv.create_app("note", "Note").await;

    let res = srv
        .post(
            "/ci/apps/note/releases",
            json!({
                "version": "1.0.0",
                "artifacts": [
                    { "platform": "linux-x86_64", "signature": null, "r2_key": "note/releases/1.0.0/never-uploaded.tar.gz" }
                ]
            }),
        )
        .await;
    assert_eq!(res.status(), 404);
    assert_eq!(common::error_code(res).await, "not_found_in_storage");
}

#[tokio::test]
async fn without_auto_publish_the_release_stays_draft() {
    let srv = common::spawn().await;
    srv.create_app("note", "Note").await;

    let res = srv
        .post(
            "/ci/apps/note/releases",
            json!({ "version": "1.0.0", "artifacts": [] }),
        )
        .await;
    assert_eq!(res.status(), 201);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["release"]["status"], "draft");
    assert!(body["release"]["pub_date"].is_null());

    let res = srv.get_public("/note/update/darwin-aarch64/0.1.0").await;
    assert_eq!(res.status(), 204);
}

#[tokio::test]
async fn ci_keys_are_bound_to_their_app() {
    let srv = common::spawn().await;
    let note = srv.create_app("note", "Note").await;
    srv.create_app("other", "Other").await;

    let (ci_key, _) = srv
        .ctx
        .keys
        .create_bearer_key("pipeline", KeyScope::Ci, Some(note["id"].as_str().unwrap()))
        .await
        .unwrap();

    // Allowed against its own app.
    let res = srv
        .client
        .post(srv.url("/ci/apps/note/releases"))
        .bearer_auth(&ci_key)
        .json(&json!({ "version": "1.0.0" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    // Forbidden against another app, even though the key authenticates.
    let res = srv
        .client
        .post(srv.url("/ci/apps/other/releases"))
        .bearer_auth(&ci_key)
        .json(&json!({ "version": "1.0.0" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
}
