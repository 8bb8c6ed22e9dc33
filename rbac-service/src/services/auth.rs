//! Authentication flows: signup, login with lockout, password reset and
//! email verification via single-use tokens.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::models::{AuditEvent, OneTimeToken, OneTimeTokenKind, User};
use crate::services::{AuditRecorder, JwtService, Mailer};
use crate::store::Store;
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

const ONE_TIME_TOKEN_BYTES: usize = 32;

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    jwt: JwtService,
    mailer: Arc<dyn Mailer>,
    audit: AuditRecorder,
    lockout_threshold: i32,
    lockout_minutes: i64,
    frontend_origin: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        jwt: JwtService,
        mailer: Arc<dyn Mailer>,
        audit: AuditRecorder,
        security: &SecurityConfig,
    ) -> Self {
        Self {
            store,
            jwt,
            mailer,
            audit,
            lockout_threshold: security.lockout_threshold,
            lockout_minutes: security.lockout_minutes,
            frontend_origin: security.frontend_origin.clone(),
        }
    }

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        request_id: Option<&str>,
    ) -> Result<(String, User), AppError> {
        let email = email.to_lowercase();
        let hash = hash_password(&Password::new(password.to_string()))?;
        let (user, first) = self.store.signup_user(&email, hash.as_str()).await?;

        self.audit
            .record(
                AuditEvent::SignupSuccess,
                Some("user"),
                Some(user.id.to_string()),
                Some(user.id),
                json!({ "email": user.email, "bootstrap_admin": first }),
                request_id,
            )
            .await?;

        let token = self.jwt.issue(user.id, false)?;
        Ok((token, user))
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        request_id: Option<&str>,
    ) -> Result<(String, User), AppError> {
        let email = email.to_lowercase();
        let now = Utc::now();

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            // Unknown account and wrong password are indistinguishable to
            // the caller.
            self.audit
                .record(
                    AuditEvent::LoginFailure,
                    Some("user"),
                    None,
                    None,
                    json!({ "email": email, "reason": "unknown_account" }),
                    request_id,
                )
                .await?;
            return Err(AppError::InvalidCredentials);
        };

        if user.is_locked(now) {
            self.audit
                .record(
                    AuditEvent::LoginLocked,
                    Some("user"),
                    Some(user.id.to_string()),
                    None,
                    json!({ "email": user.email }),
                    request_id,
                )
                .await?;
            return Err(AppError::AccountLocked);
        }

        let hash = PasswordHashString::new(user.password_hash.clone());
        if !verify_password(&Password::new(password.to_string()), &hash) {
            let after = self
                .store
                .record_login_failure(user.id, self.lockout_threshold, self.lockout_minutes)
                .await?;
            self.audit
                .record(
                    AuditEvent::LoginFailure,
                    Some("user"),
                    Some(user.id.to_string()),
                    None,
                    json!({ "email": user.email, "reason": "bad_password" }),
                    request_id,
                )
                .await?;
            if after.is_locked(Utc::now()) {
                self.audit
                    .record(
                        AuditEvent::LoginLocked,
                        Some("user"),
                        Some(user.id.to_string()),
                        None,
                        json!({ "email": user.email }),
                        request_id,
                    )
                    .await?;
            }
            return Err(AppError::InvalidCredentials);
        }

        self.store.record_login_success(user.id).await?;
        self.audit
            .record(
                AuditEvent::LoginSuccess,
                Some("user"),
                Some(user.id.to_string()),
                Some(user.id),
                json!({ "email": user.email, "remember_me": remember_me }),
                request_id,
            )
            .await?;

        let token = self.jwt.issue(user.id, remember_me)?;
        Ok((token, user))
    }

    /// Always succeeds from the caller's point of view; a reset link only
    /// goes out when the account exists.
    pub async fn request_password_reset(
        &self,
        email: &str,
        request_id: Option<&str>,
    ) -> Result<(), AppError> {
        let email = email.to_lowercase();
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Ok(());
        };

        let token = generate_token();
        self.store
            .create_one_time_token(&OneTimeToken::new_password_reset(user.id, token.clone()))
            .await?;
        self.audit
            .record(
                AuditEvent::PasswordResetRequested,
                Some("user"),
                Some(user.id.to_string()),
                None,
                json!({ "email": user.email }),
                request_id,
            )
            .await?;

        let link = format!("{}/reset-password?token={}", self.frontend_origin, token);
        self.mailer.send_password_reset(&user.email, &link).await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        request_id: Option<&str>,
    ) -> Result<(), AppError> {
        let Some(user_id) = self
            .store
            .consume_one_time_token(token, OneTimeTokenKind::PasswordReset)
            .await?
        else {
            return Err(AppError::token_invalid("reset token unknown, expired or used"));
        };

        let hash = hash_password(&Password::new(new_password.to_string()))?;
        self.store.update_password(user_id, hash.as_str()).await?;
        self.audit
            .record(
                AuditEvent::PasswordResetCompleted,
                Some("user"),
                Some(user_id.to_string()),
                Some(user_id),
                json!({}),
                request_id,
            )
            .await
    }

    pub async fn request_email_verify(
        &self,
        user: &User,
        request_id: Option<&str>,
    ) -> Result<(), AppError> {
        let token = generate_token();
        self.store
            .create_one_time_token(&OneTimeToken::new_email_verification(
                user.id,
                token.clone(),
            ))
            .await?;
        self.audit
            .record(
                AuditEvent::EmailVerifyRequested,
                Some("user"),
                Some(user.id.to_string()),
                Some(user.id),
                json!({ "email": user.email }),
                request_id,
            )
            .await?;

        let link = format!("{}/verify-email?token={}", self.frontend_origin, token);
        self.mailer.send_email_verification(&user.email, &link).await
    }

    pub async fn verify_email(
        &self,
        token: &str,
        request_id: Option<&str>,
    ) -> Result<(), AppError> {
        let Some(user_id) = self
            .store
            .consume_one_time_token(token, OneTimeTokenKind::EmailVerification)
            .await?
        else {
            return Err(AppError::token_invalid(
                "verification token unknown, expired or used",
            ));
        };

        self.store.mark_email_verified(user_id).await?;
        self.audit
            .record(
                AuditEvent::EmailVerified,
                Some("user"),
                Some(user_id.to_string()),
                Some(user_id),
                json!({}),
                request_id,
            )
            .await
    }

    pub fn verify_session(&self, token: &str) -> Option<Uuid> {
        self.jwt.verify(token).and_then(|claims| claims.user_id())
    }
}

/// 32 random bytes, URL-safe base64 without padding.
fn generate_token() -> String {
    let mut bytes = [0u8; ONE_TIME_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
