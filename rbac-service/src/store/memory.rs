//! In-memory [`Store`] for tests.
//!
//! Mirrors the Postgres semantics (unique emails, atomic lockout counting,
//! single-use tokens) behind a single mutex so integration tests can drive
//! the full router without a database.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use service_core::error::AppError;
use uuid::Uuid;

use super::{Store, EMAIL_TAKEN, GROUP_NAME_TAKEN};
use crate::models::{
    perms, AuditLog, ChangeAction, Group, GroupMember, NewAuditLog, OneTimeToken,
    OneTimeTokenKind, Permission, User, UserPatch,
};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    groups: Vec<Group>,
    permissions: Vec<Permission>,
    // (group_id, user_id)
    memberships: HashSet<(Uuid, Uuid)>,
    // (group_id, permission_id)
    grants: HashSet<(Uuid, Uuid)>,
    tokens: Vec<OneTimeToken>,
    audit: Vec<AuditLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("memory store mutex poisoned")))
    }

    /// Test helper: force a stored one-time token past its expiry.
    pub fn expire_token(&self, token: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(t) = inner.tokens.iter_mut().find(|t| t.token == token) {
                t.expires_at = Utc::now() - Duration::seconds(1);
            }
        }
    }

    /// Test helper: most recently issued token of the given kind for a user.
    pub fn latest_token_for(&self, user_id: Uuid, kind: OneTimeTokenKind) -> Option<String> {
        let inner = self.inner.lock().ok()?;
        inner
            .tokens
            .iter()
            .rev()
            .find(|t| t.user_id == user_id && t.kind == kind.as_str())
            .map(|t| t.token.clone())
    }
}

impl Inner {
    fn group_id_by_name(&self, name: &str) -> Option<Uuid> {
        self.groups.iter().find(|g| g.name == name).map(|g| g.id)
    }

    fn permission_names_for_group(&self, group_id: Uuid) -> Vec<String> {
        let mut names: Vec<String> = self
            .permissions
            .iter()
            .filter(|p| self.grants.contains(&(group_id, p.id)))
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        names
    }

    fn holders(&self, permission: &str, skip: impl Fn(Uuid, Uuid) -> bool) -> i64 {
        let Some(perm_id) = self
            .permissions
            .iter()
            .find(|p| p.name == permission)
            .map(|p| p.id)
        else {
            return 0;
        };
        let granting: HashSet<Uuid> = self
            .grants
            .iter()
            .filter(|(_, pid)| *pid == perm_id)
            .map(|(gid, _)| *gid)
            .collect();
        self.users
            .iter()
            .filter(|u| u.is_active)
            .filter(|u| {
                self.memberships
                    .iter()
                    .any(|(gid, uid)| *uid == u.id && granting.contains(gid) && !skip(*gid, *uid))
            })
            .count() as i64
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }

    async fn seed_defaults(&self) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        for name in perms::ALL {
            if !inner.permissions.iter().any(|p| p.name == *name) {
                inner
                    .permissions
                    .push(Permission::new(name.to_string(), None));
            }
        }
        if inner.group_id_by_name("Admins").is_none() {
            inner.groups.push(Group::new(
                "Admins".into(),
                Some("Full administrative access".into()),
            ));
        }
        if inner.group_id_by_name("Default").is_none() {
            inner.groups.push(Group::new(
                "Default".into(),
                Some("Baseline group with no permissions".into()),
            ));
        }
        let admins = inner.group_id_by_name("Admins").unwrap_or_default();
        let perm_ids: Vec<Uuid> = inner.permissions.iter().map(|p| p.id).collect();
        for pid in perm_ids {
            inner.grants.insert((admins, pid));
        }
        Ok(())
    }

    async fn signup_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<(User, bool), AppError> {
        let mut inner = self.lock()?;
        if inner.users.iter().any(|u| u.email == email) {
            return Err(AppError::conflict(EMAIL_TAKEN));
        }
        let first = inner.users.is_empty();
        let user = User::new(email.to_string(), password_hash.to_string());
        if first {
            if let Some(admins) = inner.group_id_by_name("Admins") {
                inner.memberships.insert((admins, user.id));
            }
        }
        inner.users.push(user.clone());
        Ok((user, first))
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        group_ids: &[Uuid],
    ) -> Result<User, AppError> {
        let mut inner = self.lock()?;
        if inner.users.iter().any(|u| u.email == email) {
            return Err(AppError::conflict(EMAIL_TAKEN));
        }
        for gid in group_ids {
            if !inner.groups.iter().any(|g| g.id == *gid) {
                return Err(AppError::not_found("group"));
            }
        }
        let user = User::new(email.to_string(), password_hash.to_string());
        for gid in group_ids {
            inner.memberships.insert((*gid, user.id));
        }
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .users
            .iter()
            .find(|u| u.email == email.to_lowercase())
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let inner = self.lock()?;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let inner = self.lock()?;
        let mut users = inner.users.clone();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn update_user_fields(&self, id: Uuid, patch: &UserPatch) -> Result<User, AppError> {
        let mut inner = self.lock()?;
        if let Some(email) = &patch.email {
            if inner.users.iter().any(|u| u.email == *email && u.id != id) {
                return Err(AppError::conflict(EMAIL_TAKEN));
            }
        }
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::not_found("user"))?;
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        if let Some(active) = patch.is_active {
            user.is_active = active;
        }
        if let Some(must_reset) = patch.must_reset_password {
            user.must_reset_password = must_reset;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        threshold: i32,
        lock_minutes: i64,
    ) -> Result<User, AppError> {
        let mut inner = self.lock()?;
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::not_found("user"))?;
        let now = Utc::now();
        if !user.is_locked(now) {
            if user.failed_logins + 1 >= threshold {
                user.failed_logins = 0;
                user.locked_until = Some(now + Duration::minutes(lock_minutes));
            } else {
                user.failed_logins += 1;
            }
            user.updated_at = now;
        }
        Ok(user.clone())
    }

    async fn record_login_success(&self, id: Uuid) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.failed_logins = 0;
            user.locked_until = None;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.password_hash = password_hash.to_string();
            user.must_reset_password = false;
            user.failed_logins = 0;
            user.locked_until = None;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.is_email_verified = true;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Group, AppError> {
        let mut inner = self.lock()?;
        if inner.groups.iter().any(|g| g.name == name) {
            return Err(AppError::conflict(GROUP_NAME_TAKEN));
        }
        let group = Group::new(name.to_string(), description.map(str::to_string));
        inner.groups.push(group.clone());
        Ok(group)
    }

    async fn find_group_by_id(&self, id: Uuid) -> Result<Option<Group>, AppError> {
        let inner = self.lock()?;
        Ok(inner.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        let inner = self.lock()?;
        let mut groups = inner.groups.clone();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn patch_group(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Group, AppError> {
        let mut inner = self.lock()?;
        if let Some(name) = name {
            if inner.groups.iter().any(|g| g.name == name && g.id != id) {
                return Err(AppError::conflict(GROUP_NAME_TAKEN));
            }
        }
        let group = inner
            .groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| AppError::not_found("group"))?;
        if let Some(name) = name {
            group.name = name.to_string();
        }
        if let Some(description) = description {
            group.description = Some(description.to_string());
        }
        group.updated_at = Utc::now();
        Ok(group.clone())
    }

    async fn group_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, AppError> {
        let inner = self.lock()?;
        let mut members: Vec<GroupMember> = inner
            .users
            .iter()
            .filter(|u| inner.memberships.contains(&(group_id, u.id)))
            .map(|u| GroupMember {
                id: u.id,
                email: u.email.clone(),
            })
            .collect();
        members.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(members)
    }

    async fn group_permission_names(&self, group_id: Uuid) -> Result<Vec<String>, AppError> {
        let inner = self.lock()?;
        Ok(inner.permission_names_for_group(group_id))
    }

    async fn change_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        action: ChangeAction,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        match action {
            ChangeAction::Add => {
                inner.memberships.insert((group_id, user_id));
            }
            ChangeAction::Remove => {
                inner.memberships.remove(&(group_id, user_id));
            }
        }
        Ok(())
    }

    async fn change_group_permission(
        &self,
        group_id: Uuid,
        permission: &str,
        action: ChangeAction,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        match action {
            ChangeAction::Add => {
                let perm_id = match inner.permissions.iter().find(|p| p.name == permission) {
                    Some(p) => p.id,
                    None => {
                        let p = Permission::new(permission.to_string(), None);
                        let id = p.id;
                        inner.permissions.push(p);
                        id
                    }
                };
                inner.grants.insert((group_id, perm_id));
            }
            ChangeAction::Remove => {
                if let Some(perm_id) = inner
                    .permissions
                    .iter()
                    .find(|p| p.name == permission)
                    .map(|p| p.id)
                {
                    inner.grants.remove(&(group_id, perm_id));
                }
            }
        }
        Ok(())
    }

    async fn user_group_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let inner = self.lock()?;
        let mut ids: Vec<Uuid> = inner
            .memberships
            .iter()
            .filter(|(_, uid)| *uid == user_id)
            .map(|(gid, _)| *gid)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn effective_permissions(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let inner = self.lock()?;
        let group_ids: HashSet<Uuid> = inner
            .memberships
            .iter()
            .filter(|(_, uid)| *uid == user_id)
            .map(|(gid, _)| *gid)
            .collect();
        let mut names: Vec<String> = inner
            .permissions
            .iter()
            .filter(|p| {
                group_ids
                    .iter()
                    .any(|gid| inner.grants.contains(&(*gid, p.id)))
            })
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn count_holders_excluding_group(
        &self,
        permission: &str,
        group_id: Uuid,
    ) -> Result<i64, AppError> {
        let inner = self.lock()?;
        Ok(inner.holders(permission, |gid, _| gid == group_id))
    }

    async fn count_holders_excluding_member(
        &self,
        permission: &str,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<i64, AppError> {
        let inner = self.lock()?;
        Ok(inner.holders(permission, |gid, uid| gid == group_id && uid == user_id))
    }

    async fn create_one_time_token(&self, token: &OneTimeToken) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        inner.tokens.push(token.clone());
        Ok(())
    }

    async fn consume_one_time_token(
        &self,
        token: &str,
        kind: OneTimeTokenKind,
    ) -> Result<Option<Uuid>, AppError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let Some(stored) = inner
            .tokens
            .iter_mut()
            .find(|t| t.token == token && t.kind == kind.as_str())
        else {
            return Ok(None);
        };
        if !stored.is_valid(now) {
            return Ok(None);
        }
        stored.used_at = Some(now);
        Ok(Some(stored.user_id))
    }

    async fn append_audit(&self, entry: &NewAuditLog) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        inner.audit.push(AuditLog {
            id: Uuid::new_v4(),
            event_type: entry.event_type.to_string(),
            target_type: entry.target_type.clone(),
            target_id: entry.target_id.clone(),
            actor_user_id: entry.actor_user_id,
            details: entry.details.clone(),
            request_id: entry.request_id.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditLog>, AppError> {
        let inner = self.lock()?;
        let mut logs = inner.audit.clone();
        logs.reverse();
        logs.truncate(limit as usize);
        Ok(logs)
    }
}
