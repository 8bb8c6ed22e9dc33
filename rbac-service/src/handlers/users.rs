//! User administration endpoints (behind `users.read` / `users.write`).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::request_id::RequestId;
use uuid::Uuid;

use super::user_response;
use crate::middleware::AuthUser;
use crate::models::{AuditEvent, CreateUserRequest, PatchUserRequest, UserPatch, UserResponse};
use crate::utils::{hash_password, Password, ValidatedJson};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users", body = [UserResponse]),
        (status = 403, description = "Missing users.read")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state.store.list_users().await?;
    let mut out = Vec::with_capacity(users.len());
    for user in &users {
        out.push(user_response(state.store.as_ref(), user).await?);
    }
    Ok(Json(out))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 409, description = "Email already registered"),
        (status = 403, description = "Missing users.write")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    AuthUser(actor): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.to_lowercase();
    let hash = hash_password(&Password::new(req.password))?;
    let user = state
        .store
        .create_user(&email, hash.as_str(), &req.group_ids)
        .await?;

    state
        .audit
        .record(
            AuditEvent::UserCreated,
            Some("user"),
            Some(user.id.to_string()),
            Some(actor.user.id),
            json!({ "email": user.email, "group_ids": req.group_ids }),
            Some(&request_id.0),
        )
        .await?;

    let body = user_response(state.store.as_ref(), &user).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail", body = UserResponse),
        (status = 404, description = "Unknown user")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .store
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    Ok(Json(user_response(state.store.as_ref(), &user).await?))
}

#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = PatchUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn patch_user(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<PatchUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    // Admins deactivate other accounts, never their own.
    if actor.user.id == id && req.is_active == Some(false) {
        return Err(AppError::validation("cannot deactivate your own account"));
    }

    let patch = UserPatch {
        email: req.email.map(|e| e.to_lowercase()),
        is_active: req.is_active,
        must_reset_password: req.must_reset_password,
    };
    if patch.is_empty() {
        return Err(AppError::validation("no fields to update"));
    }

    let mut changed = Vec::new();
    if patch.email.is_some() {
        changed.push("email");
    }
    if patch.is_active.is_some() {
        changed.push("is_active");
    }
    if patch.must_reset_password.is_some() {
        changed.push("must_reset_password");
    }

    let user = state.store.update_user_fields(id, &patch).await?;

    state
        .audit
        .record(
            AuditEvent::UserUpdated,
            Some("user"),
            Some(user.id.to_string()),
            Some(actor.user.id),
            json!({ "fields": changed }),
            Some(&request_id.0),
        )
        .await?;

    Ok(Json(user_response(state.store.as_ref(), &user).await?))
}
