//! Permission resolution and the authorization gate.

mod common;

use axum::http::StatusCode;
use common::{error_code, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

async fn group_id_by_name(app: &TestApp, admin_token: &str, name: &str) -> Uuid {
    let (status, body) = app.get_auth("/api/groups", admin_token).await;
    assert_eq!(status, StatusCode::OK);
    body.as_array()
        .expect("groups array")
        .iter()
        .find(|g| g["name"] == name)
        .and_then(|g| g["id"].as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("group id")
}

#[tokio::test]
async fn missing_permission_yields_403_with_required_name() {
    let app = TestApp::new().await;
    app.signup("root@example.com", "password123").await;
    let (user_token, _) = app.signup("user@example.com", "password123").await;

    let (status, body) = app.get_auth("/api/users", &user_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "FORBIDDEN");
    assert_eq!(body["error"]["details"]["required"], "users.read");

    let (_, body) = app.get_auth("/api/groups", &user_token).await;
    assert_eq!(body["error"]["details"]["required"], "groups.read");

    let (_, body) = app.get_auth("/api/audit", &user_token).await;
    assert_eq!(body["error"]["details"]["required"], "audit.read");
}

#[tokio::test]
async fn group_grant_is_visible_on_the_next_request() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.signup("root@example.com", "password123").await;
    let (user_token, user_id) = app.signup("user@example.com", "password123").await;

    let (status, body) = app
        .post_auth(
            "/api/groups",
            &admin_token,
            json!({ "name": "Readers", "description": "read-only staff" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = body["id"].as_str().expect("group id").to_string();

    app.post_auth(
        &format!("/api/groups/{}/perms", group_id),
        &admin_token,
        json!({ "permission": "users.read", "action": "add" }),
    )
    .await;
    app.post_auth(
        &format!("/api/groups/{}/members", group_id),
        &admin_token,
        json!({ "user_id": user_id, "action": "add" }),
    )
    .await;

    // No caching between requests: the grant applies immediately.
    let (status, _) = app.get_auth("/api/users", &user_token).await;
    assert_eq!(status, StatusCode::OK);

    // And write access is still missing.
    let (status, body) = app
        .post_auth(
            "/api/users",
            &user_token,
            json!({ "email": "x@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["details"]["required"], "users.write");

    // Removing the membership revokes on the next request too.
    app.post_auth(
        &format!("/api/groups/{}/members", group_id),
        &admin_token,
        json!({ "user_id": user_id, "action": "remove" }),
    )
    .await;
    let (status, _) = app.get_auth("/api/users", &user_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn permissions_union_across_groups_is_sorted_and_deduped() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.signup("root@example.com", "password123").await;
    let (user_token, user_id) = app.signup("user@example.com", "password123").await;

    for (name, perms) in [
        ("GroupA", vec!["users.read", "groups.read"]),
        ("GroupB", vec!["users.read", "audit.read"]),
    ] {
        let (_, body) = app
            .post_auth("/api/groups", &admin_token, json!({ "name": name }))
            .await;
        let gid = body["id"].as_str().expect("group id").to_string();
        for perm in perms {
            app.post_auth(
                &format!("/api/groups/{}/perms", gid),
                &admin_token,
                json!({ "permission": perm, "action": "add" }),
            )
            .await;
        }
        app.post_auth(
            &format!("/api/groups/{}/members", gid),
            &admin_token,
            json!({ "user_id": user_id, "action": "add" }),
        )
        .await;
    }

    let (_, body) = app.get_auth("/api/auth/me", &user_token).await;
    assert_eq!(
        body["user"]["permissions"],
        json!(["audit.read", "groups.read", "users.read"])
    );
}

#[tokio::test]
async fn admins_group_carries_every_seeded_permission() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.signup("root@example.com", "password123").await;

    let admins = group_id_by_name(&app, &admin_token, "Admins").await;
    let (_, body) = app.get_auth("/api/groups", &admin_token).await;
    let group = body
        .as_array()
        .expect("groups")
        .iter()
        .find(|g| g["id"] == json!(admins.to_string()))
        .cloned()
        .expect("admins group");

    let perms: Vec<&str> = group["permissions"]
        .as_array()
        .expect("permissions")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    for expected in [
        "admin.panel",
        "audit.read",
        "groups.read",
        "groups.write",
        "users.read",
        "users.write",
    ] {
        assert!(perms.contains(&expected), "missing {}", expected);
    }
}

#[tokio::test]
async fn granting_an_unknown_permission_name_creates_it() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.signup("root@example.com", "password123").await;

    let (_, body) = app
        .post_auth("/api/groups", &admin_token, json!({ "name": "Reporters" }))
        .await;
    let gid = body["id"].as_str().expect("group id").to_string();

    let (status, body) = app
        .post_auth(
            &format!("/api/groups/{}/perms", gid),
            &admin_token,
            json!({ "permission": "reports.export", "action": "add" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["permissions"]
        .as_array()
        .expect("permissions")
        .iter()
        .any(|p| p == "reports.export"));
}

#[tokio::test]
async fn user_admin_endpoints_roundtrip() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.signup("root@example.com", "password123").await;

    let (status, body) = app
        .post_auth(
            "/api/users",
            &admin_token,
            json!({ "email": "New.User@Example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "new.user@example.com");
    let user_id = body["id"].as_str().expect("id").to_string();

    let (status, body) = app
        .get_auth(&format!("/api/users/{}", user_id), &admin_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], true);

    let (status, body) = app
        .get_auth(&format!("/api/users/{}", Uuid::new_v4()), &admin_token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");

    let (status, body) = app.get_auth("/api/users", &admin_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().expect("users").len(), 2);
}

#[tokio::test]
async fn create_user_with_unknown_group_fails() {
    let app = TestApp::new().await;
    let (admin_token, _) = app.signup("root@example.com", "password123").await;

    let (status, body) = app
        .post_auth(
            "/api/users",
            &admin_token,
            json!({
                "email": "x@example.com",
                "password": "password123",
                "group_ids": [Uuid::new_v4()],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}
