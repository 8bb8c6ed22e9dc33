//! Audit trail read endpoint (behind `audit.read`).

use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::models::AuditLog;
use crate::AppState;

const AUDIT_PAGE_SIZE: i64 = 200;

#[utoipa::path(
    get,
    path = "/api/audit",
    responses(
        (status = 200, description = "Latest audit entries, newest first", body = [AuditLog]),
        (status = 403, description = "Missing audit.read")
    ),
    security(("bearer" = [])),
    tag = "audit"
)]
pub async fn list_audit(State(state): State<AppState>) -> Result<Json<Vec<AuditLog>>, AppError> {
    let logs = state.store.recent_audit(AUDIT_PAGE_SIZE).await?;
    Ok(Json(logs))
}
