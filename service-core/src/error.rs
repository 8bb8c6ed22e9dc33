//! Application error taxonomy shared by every handler and middleware.
//!
//! Every error renders the same JSON body:
//! `{"error": {"code": <string>, "message": <string>, "details": <object>}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: serde_json::Value,
    },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account temporarily locked")]
    AccountLocked,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Missing required permission: {required}")]
    Forbidden { required: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Token is invalid")]
    TokenInvalid(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests")]
    RateLimited { retry_after: Option<u64> },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn validation_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        AppError::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn token_invalid(message: impl Into<String>) -> Self {
        AppError::TokenInvalid(message.into())
    }

    pub fn forbidden(required: impl Into<String>) -> Self {
        AppError::Forbidden {
            required: required.into(),
        }
    }

    /// Stable machine-readable code for the error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::AccountLocked => "ACCOUNT_LOCKED",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden { .. } => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TokenInvalid(_) => "TOKEN_INVALID",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::TokenInvalid(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::AccountLocked => StatusCode::LOCKED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    details: serde_json::Value,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details, retry_after) = match self {
            AppError::Validation { message, details } => (message, details, None),
            AppError::Forbidden { required } => (
                "You do not have the required permission".to_string(),
                json!({ "required": required }),
                None,
            ),
            AppError::RateLimited { retry_after } => (
                "Too many requests".to_string(),
                json!({}),
                retry_after,
            ),
            // Token errors carry an internal reason (logged below) but the
            // external message never distinguishes missing/used/expired.
            AppError::TokenInvalid(reason) => {
                tracing::debug!(reason = %reason, "Rejecting one-time token");
                ("Token is invalid".to_string(), json!({}), None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                ("Unexpected server error".to_string(), json!({}), None)
            }
            other => (other.to_string(), json!({}), None),
        };

        let mut res = (
            status,
            Json(ErrorBody {
                error: ErrorDetail {
                    code,
                    message,
                    details,
                },
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_match_the_taxonomy() {
        let cases: Vec<(AppError, &str, StatusCode)> = vec![
            (
                AppError::validation("bad input"),
                "VALIDATION_ERROR",
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::InvalidCredentials,
                "INVALID_CREDENTIALS",
                StatusCode::UNAUTHORIZED,
            ),
            (AppError::AccountLocked, "ACCOUNT_LOCKED", StatusCode::LOCKED),
            (AppError::Unauthorized, "UNAUTHORIZED", StatusCode::UNAUTHORIZED),
            (
                AppError::forbidden("users.write"),
                "FORBIDDEN",
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::conflict("email exists"),
                "CONFLICT",
                StatusCode::CONFLICT,
            ),
            (
                AppError::token_invalid("expired"),
                "TOKEN_INVALID",
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::not_found("no such user"),
                "NOT_FOUND",
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::RateLimited { retry_after: None },
                "RATE_LIMITED",
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AppError::Internal(anyhow::anyhow!("boom")),
                "INTERNAL_ERROR",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn forbidden_carries_required_permission_in_details() {
        let res = AppError::forbidden("audit.read").into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let res = AppError::RateLimited {
            retry_after: Some(30),
        }
        .into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            res.headers()
                .get(axum::http::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("30")
        );
    }
}
