//! App registry API: slug rules, conflicts, delete guard, list projection.

mod common;

use serde_json::json;

#[tokio::test]
async fn create_get_and_list_apps() {
    let srv = common::spawn().await;

    let app = srv.create_app("note", "Note").await;
    assert_eq!(app["slug"], "note");
    assert_eq!(app["name"], "Note");
    assert_eq!(app["id"].as_str().unwrap().len(), 26);

    let res = srv.get(&format!("/admin/apps/{}", app["id"].as_str().unwrap())).await;
    assert_eq!(res.status(), 200);

    let res = srv.get("/admin/apps").await;
    assert_eq!(res.status(), 200);
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["slug"], "note");
    assert_eq!(page["items"][0]["release_count"], 0);
    assert!(page["items"][0]["latest_version"].is_null());
}

#[tokio::test]
async fn duplicate_slug_conflicts() {
    let srv = common::spawn().await;
    srv.create_app("note", "Note").await;

    let res = srv
        .post("/admin/apps", json!({ "slug": "note", "name": "Other" }))
        .await;
    assert_eq!(res.status(), 409);
    assert_eq!(common::error_code(res).await, "conflict");
}

#[tokio::test]
async fn bad_slugs_are_rejected() {
    let srv = common::spawn().await;
    for slug in ["A", "-x", "x-", "a--b", "CamelCase", "a"] {
        let res = srv
            .post("/admin/apps", json!({ "slug": slug, "name": "X" }))
            .await;
        assert_eq!(res.status(), 400, "slug '{slug}' should be rejected");
    }
}

#[tokio::test]
async fn update_app_fields() {
    let srv = common::spawn().await;
    let app = srv.create_app("note", "Note").await;
    let app_id = app["id"].as_str().unwrap();

    let res = srv
        .patch(
            &format!("/admin/apps/{app_id}"),
            json!({ "name": "Note Pro", "description": "the notes app" }),
        )
        .await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["name"], "Note Pro");
    assert_eq!(body["description"], "the notes app");
    // Slug is immutable.
    assert_eq!(body["slug"], "note");
}

#[tokio::test]
async fn delete_is_blocked_by_published_releases() {
    let srv = common::spawn().await;
    let app = srv.create_app("note", "Note").await;
    let app_id = app["id"].as_str().unwrap();

    let release = srv.create_release(app_id, "1.0.0").await;
    let release_id = release["id"].as_str().unwrap();
    srv.publish_release(app_id, release_id).await;

    let res = srv.delete(&format!("/admin/apps/{app_id}")).await;
    assert_eq!(res.status(), 409);

    // Archive the release; the app becomes deletable and cascades.
    let res = srv
        .post_empty(&format!("/admin/apps/{app_id}/releases/{release_id}/archive"))
        .await;
    assert_eq!(res.status(), 200);

    let res = srv.delete(&format!("/admin/apps/{app_id}")).await;
    assert_eq!(res.status(), 204);

    let res = srv.get(&format!("/admin/apps/{app_id}")).await;
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn list_projects_latest_published_version() {
    let srv = common::spawn().await;
    let app = srv.create_app("note", "Note").await;
    let app_id = app["id"].as_str().unwrap();

    for version in ["1.0.0", "1.1.0"] {
        let release = srv.create_release(app_id, version).await;
        srv.publish_release(app_id, release["id"].as_str().unwrap())
            .await;
    }
    // A draft does not count.
    srv.create_release(app_id, "2.0.0").await;

    let res = srv.get("/admin/apps").await;
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["items"][0]["release_count"], 3);
    assert_eq!(page["items"][0]["latest_version"], "1.1.0");
}

#[tokio::test]
async fn admin_surface_requires_bearer_key() {
    let srv = common::spawn().await;

    let res = srv.get_public("/admin/apps").await;
    assert_eq!(res.status(), 401);

    let res = srv
        .client
        .get(srv.url("/admin/apps"))
        .bearer_auth("uk_live_00000000000000000000000000000000")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}
