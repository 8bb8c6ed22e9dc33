//! Stateless session tokens (HS256).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use crate::config::JwtConfig;

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expire_minutes: i64,
    remember_days: i64,
}

/// Session claims. `sub` is the user id; `jti` makes every token unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            expire_minutes: config.expire_minutes,
            remember_days: config.remember_days,
        }
    }

    /// Issue a session token. `remember` stretches the lifetime from the
    /// default minutes to the long remember-me window.
    pub fn issue(&self, user_id: Uuid, remember: bool) -> Result<String, AppError> {
        let now = Utc::now();
        let ttl = if remember {
            Duration::days(self.remember_days)
        } else {
            Duration::minutes(self.expire_minutes)
        };
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
    }

    /// Verify a token. Every failure mode (bad signature, expired, garbage)
    /// collapses to `None`; callers never learn why a token was rejected.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .ok()
            .map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str, expire_minutes: i64) -> JwtConfig {
        JwtConfig {
            secret: secret.to_string(),
            expire_minutes,
            remember_days: 14,
        }
    }

    #[test]
    fn issue_then_verify_roundtrip() {
        let svc = JwtService::new(&config("test-secret", 60));
        let user_id = Uuid::new_v4();

        let token = svc.issue(user_id, false).expect("issue");
        let claims = svc.verify(&token).expect("verify");
        assert_eq!(claims.user_id(), Some(user_id));
    }

    #[test]
    fn wrong_secret_rejects() {
        let svc = JwtService::new(&config("secret-a", 60));
        let other = JwtService::new(&config("secret-b", 60));

        let token = svc.issue(Uuid::new_v4(), false).expect("issue");
        assert!(other.verify(&token).is_none());
    }

    #[test]
    fn expired_token_rejects() {
        // Expiry well past the validator's default leeway.
        let svc = JwtService::new(&config("test-secret", -5));
        let token = svc.issue(Uuid::new_v4(), false).expect("issue");
        assert!(svc.verify(&token).is_none());
    }

    #[test]
    fn remember_me_stretches_expiry() {
        let svc = JwtService::new(&config("test-secret", 60));
        let token = svc.issue(Uuid::new_v4(), true).expect("issue");
        let claims = svc.verify(&token).expect("verify");

        let lifetime = claims.exp - claims.iat;
        assert_eq!(lifetime, 14 * 24 * 3600);
    }

    #[test]
    fn garbage_input_rejects() {
        let svc = JwtService::new(&config("test-secret", 60));
        assert!(svc.verify("not-a-jwt").is_none());
        assert!(svc.verify("").is_none());
    }
}
