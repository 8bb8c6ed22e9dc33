//! PostgreSQL-backed [`Store`].
//!
//! Uses sqlx runtime queries against the schema in `migrations/`.

use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::{Store, EMAIL_TAKEN, GROUP_NAME_TAKEN};
use crate::models::{
    perms, AuditLog, ChangeAction, Group, GroupMember, NewAuditLog, OneTimeToken, OneTimeTokenKind,
    User, UserPatch,
};

/// Advisory lock key serializing first-user detection during signup.
const SIGNUP_BOOTSTRAP_LOCK: i64 = 0x7262_6163_0001;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!(e))
}

/// Map a unique-index violation to CONFLICT, everything else to internal.
fn insert_err(e: sqlx::Error, conflict_message: &str) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return AppError::conflict(conflict_message);
        }
    }
    db_err(e)
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn seed_defaults(&self) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for name in perms::ALL {
            sqlx::query(
                "INSERT INTO permissions (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query(
            r#"
            INSERT INTO groups (id, name, description)
            VALUES ($1, 'Admins', 'Full administrative access'),
                   ($2, 'Default', 'Baseline group with no permissions')
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(Uuid::new_v4())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO group_permissions (group_id, permission_id)
            SELECT g.id, p.id FROM groups g CROSS JOIN permissions p
            WHERE g.name = 'Admins'
            ON CONFLICT DO NOTHING
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn signup_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<(User, bool), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Serialize first-user detection so exactly one signup bootstraps
        // the admin.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SIGNUP_BOOTSTRAP_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let first = existing == 0;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| insert_err(e, EMAIL_TAKEN))?;

        if first {
            sqlx::query(
                r#"
                INSERT INTO group_members (group_id, user_id)
                SELECT id, $1 FROM groups WHERE name = 'Admins'
                "#,
            )
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok((user, first))
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        group_ids: &[Uuid],
    ) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| insert_err(e, EMAIL_TAKEN))?;

        for group_id in group_ids {
            let inserted = sqlx::query(
                r#"
                INSERT INTO group_members (group_id, user_id)
                SELECT $1, $2 WHERE EXISTS (SELECT 1 FROM groups WHERE id = $1)
                "#,
            )
            .bind(group_id)
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if inserted.rows_affected() == 0 {
                return Err(AppError::not_found("group"));
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn update_user_fields(&self, id: Uuid, patch: &UserPatch) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                is_active = COALESCE($3, is_active),
                must_reset_password = COALESCE($4, must_reset_password),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.email.as_deref())
        .bind(patch.is_active)
        .bind(patch.must_reset_password)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| insert_err(e, EMAIL_TAKEN))?
        .ok_or_else(|| AppError::not_found("user"))
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        threshold: i32,
        lock_minutes: i64,
    ) -> Result<User, AppError> {
        // Single statement so two concurrent failures cannot both read the
        // same counter. The WHERE clause skips accounts already locked.
        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                failed_logins = CASE WHEN failed_logins + 1 >= $2 THEN 0
                                     ELSE failed_logins + 1 END,
                locked_until = CASE WHEN failed_logins + 1 >= $2
                                    THEN now() + make_interval(mins => $3::int)
                                    ELSE locked_until END,
                updated_at = now()
            WHERE id = $1 AND (locked_until IS NULL OR locked_until <= now())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(threshold)
        .bind(lock_minutes)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match updated {
            Some(user) => Ok(user),
            // Locked in the meantime; report the current row unchanged.
            None => self
                .find_user_by_id(id)
                .await?
                .ok_or_else(|| AppError::not_found("user")),
        }
    }

    async fn record_login_success(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users SET failed_logins = 0, locked_until = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users SET
                password_hash = $2,
                must_reset_password = FALSE,
                failed_logins = 0,
                locked_until = NULL,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET is_email_verified = TRUE, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Group, AppError> {
        sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (id, name, description)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_err(e, GROUP_NAME_TAKEN))
    }

    async fn find_group_by_id(&self, id: Uuid) -> Result<Option<Group>, AppError> {
        sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        sqlx::query_as::<_, Group>("SELECT * FROM groups ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn patch_group(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Group, AppError> {
        sqlx::query_as::<_, Group>(
            r#"
            UPDATE groups SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| insert_err(e, GROUP_NAME_TAKEN))?
        .ok_or_else(|| AppError::not_found("group"))
    }

    async fn group_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, AppError> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT u.id, u.email FROM users u
            JOIN group_members gm ON gm.user_id = u.id
            WHERE gm.group_id = $1
            ORDER BY u.email
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|(id, email)| GroupMember { id, email })
            .collect())
    }

    async fn group_permission_names(&self, group_id: Uuid) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name FROM permissions p
            JOIN group_permissions gp ON gp.permission_id = p.id
            WHERE gp.group_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn change_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        action: ChangeAction,
    ) -> Result<(), AppError> {
        match action {
            ChangeAction::Add => {
                sqlx::query(
                    r#"
                    INSERT INTO group_members (group_id, user_id)
                    VALUES ($1, $2)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(group_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            }
            ChangeAction::Remove => {
                sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
                    .bind(group_id)
                    .bind(user_id)
                    .execute(&self.pool)
                    .await
                    .map_err(db_err)?;
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
        match action {
            ChangeAction::Add => {
                let mut tx = self.pool.begin().await.map_err(db_err)?;
                // Unknown names become new permissions on grant.
                sqlx::query(
                    r#"
                    INSERT INTO permissions (id, name) VALUES ($1, $2)
                    ON CONFLICT (name) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(permission)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                sqlx::query(
                    r#"
                    INSERT INTO group_permissions (group_id, permission_id)
                    SELECT $1, id FROM permissions WHERE name = $2
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(group_id)
                .bind(permission)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                tx.commit().await.map_err(db_err)?;
            }
            ChangeAction::Remove => {
                sqlx::query(
                    r#"
                    DELETE FROM group_permissions gp
                    USING permissions p
                    WHERE gp.permission_id = p.id AND gp.group_id = $1 AND p.name = $2
                    "#,
                )
                .bind(group_id)
                .bind(permission)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            }
        }
        Ok(())
    }

    async fn user_group_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT group_id FROM group_members WHERE user_id = $1 ORDER BY group_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn effective_permissions(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.name FROM permissions p
            JOIN group_permissions gp ON gp.permission_id = p.id
            JOIN group_members gm ON gm.group_id = gp.group_id
            WHERE gm.user_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn count_holders_excluding_group(
        &self,
        permission: &str,
        group_id: Uuid,
    ) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT gm.user_id) FROM group_members gm
            JOIN group_permissions gp ON gp.group_id = gm.group_id
            JOIN permissions p ON p.id = gp.permission_id
            JOIN users u ON u.id = gm.user_id
            WHERE p.name = $1 AND u.is_active AND gm.group_id <> $2
            "#,
        )
        .bind(permission)
        .bind(group_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn count_holders_excluding_member(
        &self,
        permission: &str,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT gm.user_id) FROM group_members gm
            JOIN group_permissions gp ON gp.group_id = gm.group_id
            JOIN permissions p ON p.id = gp.permission_id
            JOIN users u ON u.id = gm.user_id
            WHERE p.name = $1 AND u.is_active
              AND NOT (gm.group_id = $2 AND gm.user_id = $3)
            "#,
        )
        .bind(permission)
        .bind(group_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn create_one_time_token(&self, token: &OneTimeToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO one_time_tokens (id, user_id, token, kind, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(&token.kind)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn consume_one_time_token(
        &self,
        token: &str,
        kind: OneTimeTokenKind,
    ) -> Result<Option<Uuid>, AppError> {
        // Mark-used and fetch in one statement; a second caller with the
        // same token sees zero rows.
        sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE one_time_tokens SET used_at = now()
            WHERE token = $1 AND kind = $2 AND used_at IS NULL AND expires_at > now()
            RETURNING user_id
            "#,
        )
        .bind(token)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn append_audit(&self, entry: &NewAuditLog) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, event_type, target_type, target_id, actor_user_id, details, request_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.event_type)
        .bind(entry.target_type.as_deref())
        .bind(entry.target_id.as_deref())
        .bind(entry.actor_user_id)
        .bind(&entry.details)
        .bind(entry.request_id.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditLog>, AppError> {
        sqlx::query_as::<_, AuditLog>(
            "SELECT * FROM audit_logs ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}
