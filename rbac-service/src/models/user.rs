//! User model - account identity and credential state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// User entity.
///
/// `failed_logins` / `locked_until` drive the lockout guard; the account is
/// locked while `now < locked_until`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub must_reset_password: bool,
    pub failed_logins: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user record. The caller is responsible for lowercasing
    /// the email before this point.
    pub fn new(email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            is_active: true,
            is_email_verified: false,
            must_reset_password: false,
            failed_logins: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the account is inside a lockout window. Expiry is lazy: a
    /// past `locked_until` simply stops counting as locked.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

/// Partial update applied by `PATCH /api/users/{id}`.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub must_reset_password: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.is_active.is_none() && self.must_reset_password.is_none()
    }
}

/// User response for the API (no credential material).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub must_reset_password: bool,
    pub group_ids: Vec<Uuid>,
    pub permissions: Vec<String>,
}

impl UserResponse {
    pub fn new(user: &User, group_ids: Vec<Uuid>, permissions: Vec<String>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            is_active: user.is_active,
            is_email_verified: user.is_email_verified,
            must_reset_password: user.must_reset_password,
            group_ids,
            permissions,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Session credential plus the authenticated identity.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RequestPasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyEmailRequest {
    #[validate(length(min = 1))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[serde(default)]
    pub group_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PatchUserRequest {
    #[validate(email)]
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub must_reset_password: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_user_starts_unlocked_and_active() {
        let user = User::new("a@example.com".into(), "hash".into());
        assert!(user.is_active);
        assert!(!user.is_email_verified);
        assert_eq!(user.failed_logins, 0);
        assert!(!user.is_locked(Utc::now()));
    }

    #[test]
    fn lock_expiry_is_lazy() {
        let mut user = User::new("a@example.com".into(), "hash".into());
        let now = Utc::now();

        user.locked_until = Some(now + Duration::minutes(15));
        assert!(user.is_locked(now));

        // The same record stops counting as locked once the window passes.
        assert!(!user.is_locked(now + Duration::minutes(16)));
    }
}
