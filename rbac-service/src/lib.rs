pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{get, patch, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::{
    create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter,
};
use service_core::middleware::request_id::request_id_middleware;
use service_core::middleware::security_headers::security_headers_middleware;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Environment, RbacConfig};
use crate::middleware::{auth_middleware, check_permission};
use crate::models::perms;
use crate::services::{AuditRecorder, AuthService, JwtService, Mailer};
use crate::store::Store;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::signup,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::me,
        handlers::auth::request_password_reset,
        handlers::auth::reset_password,
        handlers::auth::request_email_verify,
        handlers::auth::verify_email,
        handlers::users::list_users,
        handlers::users::create_user,
        handlers::users::get_user,
        handlers::users::patch_user,
        handlers::groups::list_groups,
        handlers::groups::create_group,
        handlers::groups::patch_group,
        handlers::groups::change_members,
        handlers::groups::change_perms,
        handlers::audit::list_audit,
    ),
    components(schemas(
        models::SignupRequest,
        models::LoginRequest,
        models::LoginResponse,
        models::UserResponse,
        models::CreateUserRequest,
        models::PatchUserRequest,
        models::RequestPasswordResetRequest,
        models::ResetPasswordRequest,
        models::VerifyEmailRequest,
        models::CreateGroupRequest,
        models::PatchGroupRequest,
        models::MembershipChangeRequest,
        models::PermissionChangeRequest,
        models::ChangeAction,
        models::GroupResponse,
        models::GroupMember,
        models::AuditLog,
        handlers::auth::MeResponse,
        handlers::OkResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication and account recovery"),
        (name = "users", description = "User administration"),
        (name = "groups", description = "Group and permission administration"),
        (name = "audit", description = "Audit trail"),
        (name = "observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: RbacConfig,
    pub store: Arc<dyn Store>,
    pub auth: AuthService,
    pub audit: AuditRecorder,
    pub login_rate_limiter: IpRateLimiter,
    pub reset_request_rate_limiter: IpRateLimiter,
    pub reset_confirm_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(config: RbacConfig, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        let jwt = JwtService::new(&config.jwt);
        let audit = AuditRecorder::new(store.clone());
        let auth = AuthService::new(
            store.clone(),
            jwt,
            mailer,
            audit.clone(),
            &config.security,
        );
        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let reset_request_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.reset_request_attempts,
            config.rate_limit.reset_request_window_seconds,
        );
        let reset_confirm_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.reset_confirm_attempts,
            config.rate_limit.reset_confirm_window_seconds,
        );

        Self {
            config,
            store,
            auth,
            audit,
            login_rate_limiter,
            reset_request_rate_limiter,
            reset_confirm_rate_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Result<Router, anyhow::Error> {
    // Credential endpoints share the strict per-IP login budget.
    let login_routes = Router::new()
        .route("/api/auth/signup", post(handlers::auth::signup))
        .route("/api/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let reset_request_routes = Router::new()
        .route(
            "/api/auth/request-password-reset",
            post(handlers::auth::request_password_reset),
        )
        .layer(from_fn_with_state(
            state.reset_request_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let reset_confirm_routes = Router::new()
        .route("/api/auth/reset-password", post(handlers::auth::reset_password))
        .layer(from_fn_with_state(
            state.reset_confirm_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let users_read = Router::new()
        .route("/api/users", get(handlers::users::list_users))
        .route("/api/users/:id", get(handlers::users::get_user))
        .route_layer(from_fn(|req: Request, next: Next| {
            check_permission(req, next, perms::USERS_READ)
        }));
    let users_write = Router::new()
        .route("/api/users", post(handlers::users::create_user))
        .route("/api/users/:id", patch(handlers::users::patch_user))
        .route_layer(from_fn(|req: Request, next: Next| {
            check_permission(req, next, perms::USERS_WRITE)
        }));

    let groups_read = Router::new()
        .route("/api/groups", get(handlers::groups::list_groups))
        .route_layer(from_fn(|req: Request, next: Next| {
            check_permission(req, next, perms::GROUPS_READ)
        }));
    let groups_write = Router::new()
        .route("/api/groups", post(handlers::groups::create_group))
        .route("/api/groups/:id", patch(handlers::groups::patch_group))
        .route("/api/groups/:id/members", post(handlers::groups::change_members))
        .route("/api/groups/:id/perms", post(handlers::groups::change_perms))
        .route_layer(from_fn(|req: Request, next: Next| {
            check_permission(req, next, perms::GROUPS_WRITE)
        }));

    let audit_read = Router::new()
        .route("/api/audit", get(handlers::audit::list_audit))
        .route_layer(from_fn(|req: Request, next: Next| {
            check_permission(req, next, perms::AUDIT_READ)
        }));

    // Everything behind bearer auth.
    let protected = Router::new()
        .route("/api/auth/me", get(handlers::auth::me))
        .route(
            "/api/auth/request-email-verify",
            post(handlers::auth::request_email_verify),
        )
        .merge(users_read)
        .merge(users_write)
        .merge(groups_read)
        .merge(groups_write)
        .merge(audit_read)
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut app = Router::new().route("/health", get(health_check));

    let swagger_enabled =
        state.config.environment == Environment::Dev && state.config.swagger_enabled;
    if swagger_enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    let cors_origin = state
        .config
        .security
        .frontend_origin
        .parse::<HeaderValue>()
        .map_err(|e| anyhow::anyhow!("FRONTEND_ORIGIN is not a valid header value: {e}"))?;

    let app = app
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/verify-email", post(handlers::auth::verify_email))
        .merge(login_routes)
        .merge(reset_request_routes)
        .merge(reset_confirm_routes)
        .merge(protected)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origin)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

async fn not_found() -> AppError {
    AppError::not_found("resource")
}

// 405 keeps its status but still renders the uniform error body.
async fn method_not_allowed() -> impl axum::response::IntoResponse {
    (
        axum::http::StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({
            "error": {
                "code": "METHOD_NOT_ALLOWED",
                "message": "method not allowed for this resource",
                "details": {},
            }
        })),
    )
}

/// Service health check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Storage unreachable")
    ),
    tag = "observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.ping().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": state.config.service_name,
    })))
}
