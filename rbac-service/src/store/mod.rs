//! Persistence seam for the service.
//!
//! Handlers and services speak to a [`Store`] trait object; `PgStore` backs
//! production, `MemoryStore` backs black-box tests without a database.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    AuditLog, ChangeAction, Group, GroupMember, NewAuditLog, OneTimeToken, OneTimeTokenKind, User,
    UserPatch,
};

pub(crate) const EMAIL_TAKEN: &str = "an account with this email already exists";
pub(crate) const GROUP_NAME_TAKEN: &str = "a group with this name already exists";

#[async_trait]
pub trait Store: Send + Sync {
    /// Liveness probe against the backing storage.
    async fn ping(&self) -> Result<(), AppError>;

    /// Idempotent startup seeding: the canonical permissions plus the
    /// `Admins` (all permissions) and `Default` (none) groups.
    async fn seed_defaults(&self) -> Result<(), AppError>;

    // ---- users ----

    /// Self-service registration. Returns the new user and whether it was
    /// the first account ever created; the first account is placed in the
    /// `Admins` group inside the same transaction.
    async fn signup_user(&self, email: &str, password_hash: &str)
        -> Result<(User, bool), AppError>;

    /// Admin-driven creation, optionally joining the given groups.
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        group_ids: &[Uuid],
    ) -> Result<User, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn list_users(&self) -> Result<Vec<User>, AppError>;
    async fn update_user_fields(&self, id: Uuid, patch: &UserPatch) -> Result<User, AppError>;

    /// Count one failed login attempt. Locks the account for `lock_minutes`
    /// and resets the counter once it would reach `threshold`; a currently
    /// locked account is left untouched. Returns the resulting row.
    async fn record_login_failure(
        &self,
        id: Uuid,
        threshold: i32,
        lock_minutes: i64,
    ) -> Result<User, AppError>;

    /// Clear the failure counter and any lock after a successful login.
    async fn record_login_success(&self, id: Uuid) -> Result<(), AppError>;

    /// Replace the password hash; also clears `must_reset_password` and any
    /// lockout state.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;

    async fn mark_email_verified(&self, id: Uuid) -> Result<(), AppError>;

    // ---- groups ----

    async fn create_group(&self, name: &str, description: Option<&str>)
        -> Result<Group, AppError>;
    async fn find_group_by_id(&self, id: Uuid) -> Result<Option<Group>, AppError>;
    async fn list_groups(&self) -> Result<Vec<Group>, AppError>;
    async fn patch_group(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Group, AppError>;

    async fn group_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, AppError>;
    async fn group_permission_names(&self, group_id: Uuid) -> Result<Vec<String>, AppError>;

    /// Add or remove a user from a group; both operations are idempotent.
    async fn change_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        action: ChangeAction,
    ) -> Result<(), AppError>;

    /// Grant or revoke a permission on a group. Granting an unknown
    /// permission name creates the permission.
    async fn change_group_permission(
        &self,
        group_id: Uuid,
        permission: &str,
        action: ChangeAction,
    ) -> Result<(), AppError>;

    async fn user_group_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError>;

    /// Sorted, deduplicated union of permission names across the user's
    /// groups. Computed fresh on every call.
    async fn effective_permissions(&self, user_id: Uuid) -> Result<Vec<String>, AppError>;

    /// Active users who would still hold `permission` if the grant through
    /// `group_id` went away.
    async fn count_holders_excluding_group(
        &self,
        permission: &str,
        group_id: Uuid,
    ) -> Result<i64, AppError>;

    /// Active users who would still hold `permission` if `user_id` left
    /// `group_id`.
    async fn count_holders_excluding_member(
        &self,
        permission: &str,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<i64, AppError>;

    // ---- one-time tokens ----

    async fn create_one_time_token(&self, token: &OneTimeToken) -> Result<(), AppError>;

    /// Atomically consume a token: marks it used and returns the owning user
    /// id, or `None` when the token is unknown, the wrong kind, expired, or
    /// already used.
    async fn consume_one_time_token(
        &self,
        token: &str,
        kind: OneTimeTokenKind,
    ) -> Result<Option<Uuid>, AppError>;

    // ---- audit ----

    async fn append_audit(&self, entry: &NewAuditLog) -> Result<(), AppError>;
    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditLog>, AppError>;
}
