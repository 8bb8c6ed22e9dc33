//! Authentication endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::Serialize;
use service_core::error::AppError;
use service_core::middleware::request_id::RequestId;
use utoipa::ToSchema;

use super::{user_response, OkResponse};
use crate::middleware::AuthUser;
use crate::models::{
    LoginRequest, LoginResponse, RequestPasswordResetRequest, ResetPasswordRequest, SignupRequest,
    UserResponse, VerifyEmailRequest,
};
use crate::utils::ValidatedJson;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
}

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = LoginResponse),
        (status = 409, description = "Email already registered"),
        (status = 400, description = "Validation error")
    ),
    tag = "auth"
)]
pub async fn signup(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (token, user) = state
        .auth
        .signup(&req.email, &req.password, Some(&request_id.0))
        .await?;
    let user = user_response(state.store.as_ref(), &user).await?;
    Ok((StatusCode::CREATED, Json(LoginResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 423, description = "Account temporarily locked"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (token, user) = state
        .auth
        .login(&req.email, &req.password, req.remember_me, Some(&request_id.0))
        .await?;
    let user = user_response(state.store.as_ref(), &user).await?;
    Ok(Json(LoginResponse { token, user }))
}

/// Sessions are stateless; the client discards its token.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Acknowledged", body = OkResponse)),
    tag = "auth"
)]
pub async fn logout() -> Json<OkResponse> {
    Json(OkResponse::new())
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current identity", body = MeResponse),
        (status = 401, description = "Authentication required")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    // Permissions were already resolved when the token was checked.
    let group_ids = state.store.user_group_ids(current.user.id).await?;
    let user = UserResponse::new(&current.user, group_ids, current.permissions);
    Ok(Json(MeResponse { user }))
}

#[utoipa::path(
    post,
    path = "/api/auth/request-password-reset",
    request_body = RequestPasswordResetRequest,
    responses(
        (status = 200, description = "Acknowledged whether or not the account exists", body = OkResponse),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ValidatedJson(req): ValidatedJson<RequestPasswordResetRequest>,
) -> Result<Json<OkResponse>, AppError> {
    state
        .auth
        .request_password_reset(&req.email, Some(&request_id.0))
        .await?;
    Ok(Json(OkResponse::new()))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced", body = OkResponse),
        (status = 400, description = "Token invalid"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<OkResponse>, AppError> {
    state
        .auth
        .reset_password(&req.token, &req.new_password, Some(&request_id.0))
        .await?;
    Ok(Json(OkResponse::new()))
}

#[utoipa::path(
    post,
    path = "/api/auth/request-email-verify",
    responses(
        (status = 200, description = "Verification mail queued", body = OkResponse),
        (status = 401, description = "Authentication required")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn request_email_verify(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    AuthUser(current): AuthUser,
) -> Result<Json<OkResponse>, AppError> {
    state
        .auth
        .request_email_verify(&current.user, Some(&request_id.0))
        .await?;
    Ok(Json(OkResponse::new()))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = OkResponse),
        (status = 400, description = "Token invalid")
    ),
    tag = "auth"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> Result<Json<OkResponse>, AppError> {
    state.auth.verify_email(&req.token, Some(&request_id.0)).await?;
    Ok(Json(OkResponse::new()))
}
