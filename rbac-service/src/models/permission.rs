use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(name: String, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            created_at: Utc::now(),
        }
    }
}

/// Canonical permission names seeded at startup.
pub mod perms {
    pub const USERS_READ: &str = "users.read";
    pub const USERS_WRITE: &str = "users.write";
    pub const GROUPS_READ: &str = "groups.read";
    pub const GROUPS_WRITE: &str = "groups.write";
    pub const AUDIT_READ: &str = "audit.read";
    pub const ADMIN_PANEL: &str = "admin.panel";

    pub const ALL: &[&str] = &[
        USERS_READ,
        USERS_WRITE,
        GROUPS_READ,
        GROUPS_WRITE,
        AUDIT_READ,
        ADMIN_PANEL,
    ];
}
