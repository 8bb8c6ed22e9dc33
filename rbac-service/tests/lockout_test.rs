//! Account lockout behavior around the failed-login counter.

mod common;

use axum::http::StatusCode;
use common::{error_code, TestApp};
use rbac_service::models::OneTimeTokenKind;
use rbac_service::store::Store;
use serde_json::json;

async fn fail_login(app: &TestApp, email: &str) -> (StatusCode, serde_json::Value) {
    app.post(
        "/api/auth/login",
        json!({ "email": email, "password": "definitely-wrong" }),
    )
    .await
}

#[tokio::test]
async fn fifth_failure_locks_the_account() {
    let app = TestApp::new().await;
    app.signup("a@example.com", "password123").await;

    for _ in 0..5 {
        let (status, body) = fail_login(&app, "a@example.com").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "INVALID_CREDENTIALS");
    }

    // Even the correct password is rejected while the lock holds.
    let (status, body) = app
        .post(
            "/api/auth/login",
            json!({ "email": "a@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(error_code(&body), "ACCOUNT_LOCKED");
}

#[tokio::test]
async fn four_failures_then_success_resets_the_counter() {
    let app = TestApp::new().await;
    app.signup("a@example.com", "password123").await;

    for _ in 0..4 {
        fail_login(&app, "a@example.com").await;
    }
    app.login_token("a@example.com", "password123").await;

    // A fresh run of four failures still does not lock.
    for _ in 0..4 {
        let (status, _) = fail_login(&app, "a@example.com").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    app.login_token("a@example.com", "password123").await;
}

#[tokio::test]
async fn failures_while_locked_do_not_extend_the_lock() {
    let app = TestApp::new().await;
    app.signup("a@example.com", "password123").await;

    for _ in 0..5 {
        fail_login(&app, "a@example.com").await;
    }

    let locked_until = app
        .store
        .find_user_by_email("a@example.com")
        .await
        .expect("store")
        .expect("user")
        .locked_until;
    assert!(locked_until.is_some());

    for _ in 0..3 {
        let (status, _) = fail_login(&app, "a@example.com").await;
        assert_eq!(status, StatusCode::LOCKED);
    }

    let after = app
        .store
        .find_user_by_email("a@example.com")
        .await
        .expect("store")
        .expect("user")
        .locked_until;
    assert_eq!(after, locked_until);
}

#[tokio::test]
async fn completing_a_password_reset_clears_the_lock() {
    let app = TestApp::new().await;
    let (_, user_id) = app.signup("a@example.com", "password123").await;

    for _ in 0..5 {
        fail_login(&app, "a@example.com").await;
    }

    let (status, _) = app
        .post(
            "/api/auth/request-password-reset",
            json!({ "email": "a@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let reset_token = app
        .store
        .latest_token_for(user_id, OneTimeTokenKind::PasswordReset)
        .expect("reset token");
    let (status, _) = app
        .post(
            "/api/auth/reset-password",
            json!({ "token": reset_token, "new_password": "brand-new-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    app.login_token("a@example.com", "brand-new-pass").await;
}
