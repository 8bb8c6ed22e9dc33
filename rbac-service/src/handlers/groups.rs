//! Group administration endpoints (behind `groups.read` / `groups.write`).

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

use crate::middleware::AuthUser;
use crate::models::{
    perms, AuditEvent, ChangeAction, CreateGroupRequest, Group, GroupResponse,
    MembershipChangeRequest, PatchGroupRequest, PermissionChangeRequest,
};
use crate::utils::ValidatedJson;
use crate::AppState;

async fn group_response(state: &AppState, group: &Group) -> Result<GroupResponse, AppError> {
    let members = state.store.group_members(group.id).await?;
    let permissions = state.store.group_permission_names(group.id).await?;
    Ok(GroupResponse::new(group, members, permissions))
}

#[utoipa::path(
    get,
    path = "/api/groups",
    responses(
        (status = 200, description = "All groups", body = [GroupResponse]),
        (status = 403, description = "Missing groups.read")
    ),
    security(("bearer" = [])),
    tag = "groups"
)]
pub async fn list_groups(
    State(state): State<AppState>,
) -> Result<Json<Vec<GroupResponse>>, AppError> {
    let groups = state.store.list_groups().await?;
    let mut out = Vec::with_capacity(groups.len());
    for group in &groups {
        out.push(group_response(&state, group).await?);
    }
    Ok(Json(out))
}

#[utoipa::path(
    post,
    path = "/api/groups",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created", body = GroupResponse),
        (status = 409, description = "Name already taken"),
        (status = 403, description = "Missing groups.write")
    ),
    security(("bearer" = [])),
    tag = "groups"
)]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    AuthUser(actor): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = state
        .store
        .create_group(&req.name, req.description.as_deref())
        .await?;

    state
        .audit
        .record(
            AuditEvent::GroupCreated,
            Some("group"),
            Some(group.id.to_string()),
            Some(actor.user.id),
            json!({ "name": group.name }),
            Some(&request_id.0),
        )
        .await?;

    let body = group_response(&state, &group).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[utoipa::path(
    patch,
    path = "/api/groups/{id}",
    params(("id" = Uuid, Path, description = "Group id")),
    request_body = PatchGroupRequest,
    responses(
        (status = 200, description = "Group updated", body = GroupResponse),
        (status = 404, description = "Unknown group")
    ),
    security(("bearer" = [])),
    tag = "groups"
)]
pub async fn patch_group(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<PatchGroupRequest>,
) -> Result<Json<GroupResponse>, AppError> {
    let group = state
        .store
        .patch_group(id, req.name.as_deref(), req.description.as_deref())
        .await?;

    state
        .audit
        .record(
            AuditEvent::GroupUpdated,
            Some("group"),
            Some(group.id.to_string()),
            Some(actor.user.id),
            json!({ "name": group.name }),
            Some(&request_id.0),
        )
        .await?;

    Ok(Json(group_response(&state, &group).await?))
}

#[utoipa::path(
    post,
    path = "/api/groups/{id}/members",
    params(("id" = Uuid, Path, description = "Group id")),
    request_body = MembershipChangeRequest,
    responses(
        (status = 200, description = "Membership changed", body = GroupResponse),
        (status = 400, description = "Change would leave no admin.panel holder"),
        (status = 404, description = "Unknown group or user")
    ),
    security(("bearer" = [])),
    tag = "groups"
)]
pub async fn change_members(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<MembershipChangeRequest>,
) -> Result<Json<GroupResponse>, AppError> {
    let group = state
        .store
        .find_group_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("group"))?;
    state
        .store
        .find_user_by_id(req.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    if req.action == ChangeAction::Remove {
        let grants_admin = state
            .store
            .group_permission_names(group.id)
            .await?
            .iter()
            .any(|p| p == perms::ADMIN_PANEL);
        if grants_admin {
            let remaining = state
                .store
                .count_holders_excluding_member(perms::ADMIN_PANEL, group.id, req.user_id)
                .await?;
            if remaining == 0 {
                return Err(AppError::validation(
                    "removal would leave no user with admin.panel",
                ));
            }
        }
    }

    state
        .store
        .change_membership(group.id, req.user_id, req.action)
        .await?;

    state
        .audit
        .record(
            AuditEvent::MembershipChanged,
            Some("group"),
            Some(group.id.to_string()),
            Some(actor.user.id),
            json!({
                "user_id": req.user_id,
                "action": match req.action {
                    ChangeAction::Add => "add",
                    ChangeAction::Remove => "remove",
                },
            }),
            Some(&request_id.0),
        )
        .await?;

    Ok(Json(group_response(&state, &group).await?))
}

#[utoipa::path(
    post,
    path = "/api/groups/{id}/perms",
    params(("id" = Uuid, Path, description = "Group id")),
    request_body = PermissionChangeRequest,
    responses(
        (status = 200, description = "Grant changed", body = GroupResponse),
        (status = 400, description = "Change would leave no admin.panel holder"),
        (status = 404, description = "Unknown group")
    ),
    security(("bearer" = [])),
    tag = "groups"
)]
pub async fn change_perms(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<PermissionChangeRequest>,
) -> Result<Json<GroupResponse>, AppError> {
    let group = state
        .store
        .find_group_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("group"))?;

    // Revoking admin.panel must never orphan the admin surface.
    if req.action == ChangeAction::Remove && req.permission == perms::ADMIN_PANEL {
        let remaining = state
            .store
            .count_holders_excluding_group(perms::ADMIN_PANEL, group.id)
            .await?;
        if remaining == 0 {
            return Err(AppError::validation(
                "revocation would leave no user with admin.panel",
            ));
        }
    }

    state
        .store
        .change_group_permission(group.id, &req.permission, req.action)
        .await?;

    state
        .audit
        .record(
            AuditEvent::PermissionChanged,
            Some("group"),
            Some(group.id.to_string()),
            Some(actor.user.id),
            json!({
                "permission": req.permission,
                "action": match req.action {
                    ChangeAction::Add => "add",
                    ChangeAction::Remove => "remove",
                },
            }),
            Some(&request_id.0),
        )
        .await?;

    Ok(Json(group_response(&state, &group).await?))
}
