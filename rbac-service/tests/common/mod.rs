//! Shared harness for the integration tests.
//!
//! Drives the full router through `tower::ServiceExt::oneshot` against the
//! in-memory store, so the whole HTTP surface is exercised without Postgres.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use service_core::error::AppError;
use tower::util::ServiceExt;
use uuid::Uuid;

use rbac_service::config::{
    DatabaseConfig, Environment, JwtConfig, RateLimitConfig, RbacConfig, SecurityConfig,
};
use rbac_service::services::Mailer;
use rbac_service::store::{MemoryStore, Store};
use rbac_service::{build_router, AppState};

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub link: String,
    pub kind: &'static str,
}

/// Records outbound mail instead of sending it.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl MockMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().expect("mailer lock").clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), AppError> {
        self.sent.lock().expect("mailer lock").push(SentMail {
            to: to.to_string(),
            link: link.to_string(),
            kind: "password_reset",
        });
        Ok(())
    }

    async fn send_email_verification(&self, to: &str, link: &str) -> Result<(), AppError> {
        self.sent.lock().expect("mailer lock").push(SentMail {
            to: to.to_string(),
            link: link.to_string(),
            kind: "email_verification",
        });
        Ok(())
    }
}

pub fn test_config() -> RbacConfig {
    RbacConfig {
        environment: Environment::Dev,
        service_name: "rbac-service-test".to_string(),
        log_level: "error".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
        },
        jwt: JwtConfig {
            secret: "test-secret".to_string(),
            expire_minutes: 60,
            remember_days: 14,
        },
        security: SecurityConfig {
            lockout_threshold: 5,
            lockout_minutes: 15,
            frontend_origin: "http://localhost:3000".to_string(),
        },
        rate_limit: RateLimitConfig {
            login_attempts: 5,
            login_window_seconds: 60,
            reset_request_attempts: 5,
            reset_request_window_seconds: 3600,
            reset_confirm_attempts: 10,
            reset_confirm_window_seconds: 3600,
        },
        swagger_enabled: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<MockMailer>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: RbacConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.seed_defaults().await.expect("seed defaults");
        let mailer = Arc::new(MockMailer::default());

        let state = AppState::new(
            config,
            store.clone() as Arc<dyn Store>,
            mailer.clone() as Arc<dyn Mailer>,
        );
        let router = build_router(state).expect("router");

        Self {
            router,
            store,
            mailer,
        }
    }

    /// Send one request through the router and parse the JSON body.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        forwarded_for: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        if let Some(ip) = forwarded_for {
            builder = builder.header("x-forwarded-for", ip);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// POST with a caller-chosen `x-request-id`, for correlation assertions.
    pub async fn post_with_request_id(
        &self,
        uri: &str,
        request_id: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-request-id", request_id)
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, None, None, Some(body)).await
    }

    pub async fn post_auth(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(token), None, Some(body)).await
    }

    pub async fn get_auth(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send("GET", uri, Some(token), None, None).await
    }

    pub async fn patch_auth(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("PATCH", uri, Some(token), None, Some(body)).await
    }

    /// Sign up an account and return its session token and id. The first
    /// call on a fresh app creates the bootstrap admin.
    pub async fn signup(&self, email: &str, password: &str) -> (String, Uuid) {
        let (status, body) = self
            .post(
                "/api/auth/signup",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        let token = body["token"].as_str().expect("token").to_string();
        let id = body["user"]["id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .expect("user id");
        (token, id)
    }

    pub async fn login_token(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/login",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().expect("token").to_string()
    }
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or("")
}
