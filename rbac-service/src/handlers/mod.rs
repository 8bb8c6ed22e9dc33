pub mod audit;
pub mod auth;
pub mod groups;
pub mod users;

use serde::Serialize;
use service_core::error::AppError;
use utoipa::ToSchema;

use crate::models::{User, UserResponse};
use crate::store::Store;

/// Plain acknowledgement body, used by the flows that deliberately reveal
/// nothing else.
#[derive(Debug, Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble the API view of a user: memberships plus effective permissions.
pub(crate) async fn user_response(
    store: &dyn Store,
    user: &User,
) -> Result<UserResponse, AppError> {
    let group_ids = store.user_group_ids(user.id).await?;
    let permissions = store.effective_permissions(user.id).await?;
    Ok(UserResponse::new(user, group_ids, permissions))
}
