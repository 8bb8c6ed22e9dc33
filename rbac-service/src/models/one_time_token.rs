//! Single-use tokens for password resets and email verification.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

const PASSWORD_RESET_TTL_HOURS: i64 = 1;
const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneTimeTokenKind {
    PasswordReset,
    EmailVerification,
}

impl OneTimeTokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PasswordReset => "password_reset",
            Self::EmailVerification => "email_verification",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OneTimeToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub kind: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OneTimeToken {
    fn new(user_id: Uuid, token: String, kind: OneTimeTokenKind, ttl_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            kind: kind.as_str().to_string(),
            expires_at: now + Duration::hours(ttl_hours),
            used_at: None,
            created_at: now,
        }
    }

    pub fn new_password_reset(user_id: Uuid, token: String) -> Self {
        Self::new(
            user_id,
            token,
            OneTimeTokenKind::PasswordReset,
            PASSWORD_RESET_TTL_HOURS,
        )
    }

    pub fn new_email_verification(user_id: Uuid, token: String) -> Self {
        Self::new(
            user_id,
            token,
            OneTimeTokenKind::EmailVerification,
            EMAIL_VERIFICATION_TTL_HOURS,
        )
    }

    /// Unconsumed and inside its validity window.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }
}
