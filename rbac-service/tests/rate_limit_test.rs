//! Per-IP rate limiting on the credential endpoints.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{error_code, TestApp};
use serde_json::json;
use tower::util::ServiceExt;

async fn login_from(app: &TestApp, ip: &str, email: &str) -> (StatusCode, serde_json::Value) {
    app.send(
        "POST",
        "/api/auth/login",
        None,
        Some(ip),
        Some(json!({ "email": email, "password": "wrong" })),
    )
    .await
}

#[tokio::test]
async fn sixth_login_attempt_from_one_ip_is_throttled() {
    let app = TestApp::new().await;
    app.signup("a@example.com", "password123").await;

    for _ in 0..5 {
        let (status, _) = login_from(&app, "10.9.0.1", "a@example.com").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = login_from(&app, "10.9.0.1", "a@example.com").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(&body), "RATE_LIMITED");
}

#[tokio::test]
async fn throttled_response_carries_retry_after() {
    let app = TestApp::new().await;
    app.signup("a@example.com", "password123").await;

    for _ in 0..5 {
        login_from(&app, "10.9.1.1", "a@example.com").await;
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "10.9.1.1")
        .body(Body::from(
            json!({ "email": "a@example.com", "password": "wrong" }).to_string(),
        ))
        .expect("request");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn addresses_are_throttled_independently() {
    let app = TestApp::new().await;

    // Unknown account: plain 401s that never trip the lockout guard.
    for _ in 0..6 {
        login_from(&app, "10.9.2.1", "ghost@example.com").await;
    }

    let (status, _) = login_from(&app, "10.9.2.2", "ghost@example.com").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_shares_the_login_budget() {
    let app = TestApp::new().await;

    for n in 0..5 {
        let (status, _) = app
            .send(
                "POST",
                "/api/auth/signup",
                None,
                Some("10.9.3.1"),
                Some(json!({
                    "email": format!("user{}@example.com", n),
                    "password": "password123",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/signup",
            None,
            Some("10.9.3.1"),
            Some(json!({ "email": "late@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_code(&body), "RATE_LIMITED");
}

#[tokio::test]
async fn reset_request_has_its_own_budget() {
    let app = TestApp::new().await;
    app.signup("a@example.com", "password123").await;

    for _ in 0..5 {
        let (status, _) = app
            .send(
                "POST",
                "/api/auth/request-password-reset",
                None,
                Some("10.9.4.1"),
                Some(json!({ "email": "a@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = app
        .send(
            "POST",
            "/api/auth/request-password-reset",
            None,
            Some("10.9.4.1"),
            Some(json!({ "email": "a@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // The login budget for the same address is untouched.
    let (status, _) = login_from(&app, "10.9.4.1", "a@example.com").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lockout_and_rate_limit_are_independent() {
    let app = TestApp::new().await;
    app.signup("a@example.com", "password123").await;

    // Spread the failures across addresses so no IP budget is exhausted.
    for n in 0..5 {
        let ip = format!("10.9.5.{}", n + 1);
        let (status, _) = login_from(&app, &ip, "a@example.com").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // The account lock still fired.
    let (status, body) = login_from(&app, "10.9.5.10", "a@example.com").await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(error_code(&body), "ACCOUNT_LOCKED");
}
