//! Group model - named permission bundles users belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Member entry inside a group response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupMember {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<GroupMember>,
    pub permissions: Vec<String>,
}

impl GroupResponse {
    pub fn new(group: &Group, members: Vec<GroupMember>, permissions: Vec<String>) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            description: group.description.clone(),
            members,
            permissions,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PatchGroupRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Add or remove, for membership and permission grant changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Add,
    Remove,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MembershipChangeRequest {
    pub user_id: Uuid,
    pub action: ChangeAction,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PermissionChangeRequest {
    #[validate(length(min = 1))]
    pub permission: String,
    pub action: ChangeAction,
}
