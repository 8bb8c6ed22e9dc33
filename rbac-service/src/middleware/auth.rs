//! Bearer authentication and permission enforcement.
//!
//! `auth_middleware` resolves the session token to a [`CurrentUser`] with
//! freshly computed permissions; `check_permission` gates a route on one
//! permission name. A token whose account is inactive or gone behaves
//! exactly like no token at all.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::User;
use crate::AppState;

/// Authenticated identity with its effective permissions, resolved once per
/// request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub permissions: Vec<String>,
}

impl CurrentUser {
    pub fn has(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let user_id = state.auth.verify_session(token).ok_or(AppError::Unauthorized)?;

    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !user.is_active {
        return Err(AppError::Unauthorized);
    }

    let permissions = state.store.effective_permissions(user.id).await?;

    req.extensions_mut().insert(CurrentUser { user, permissions });
    Ok(next.run(req).await)
}

/// Route layer enforcing a single permission; rejects with FORBIDDEN and
/// the missing permission name in the error details.
pub async fn check_permission(
    req: Request,
    next: Next,
    required: &'static str,
) -> Result<Response, AppError> {
    let current = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("CurrentUser missing from extensions")))?;

    if !current.has(required) {
        return Err(AppError::forbidden(required));
    }
    Ok(next.run(req).await)
}

/// Extractor for handlers behind `auth_middleware`.
pub struct AuthUser(pub CurrentUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let current = parts.extensions.get::<CurrentUser>().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("CurrentUser missing from extensions"))
        })?;
        Ok(AuthUser(current.clone()))
    }
}
