//! Append-only audit trail entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Every security-relevant event the service records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    SignupSuccess,
    LoginSuccess,
    LoginFailure,
    LoginLocked,
    PasswordResetRequested,
    PasswordResetCompleted,
    EmailVerifyRequested,
    EmailVerified,
    UserCreated,
    UserUpdated,
    GroupCreated,
    GroupUpdated,
    MembershipChanged,
    PermissionChanged,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignupSuccess => "signup.success",
            Self::LoginSuccess => "login.success",
            Self::LoginFailure => "login.failure",
            Self::LoginLocked => "login.locked",
            Self::PasswordResetRequested => "password_reset.requested",
            Self::PasswordResetCompleted => "password_reset.completed",
            Self::EmailVerifyRequested => "email_verify.requested",
            Self::EmailVerified => "email_verify.completed",
            Self::UserCreated => "user.created",
            Self::UserUpdated => "user.updated",
            Self::GroupCreated => "group.created",
            Self::GroupUpdated => "group.updated",
            Self::MembershipChanged => "group.membership_changed",
            Self::PermissionChanged => "group.permission_changed",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AuditLog {
    pub id: Uuid,
    pub event_type: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub actor_user_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A log entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub event_type: &'static str,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub actor_user_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub request_id: Option<String>,
}
