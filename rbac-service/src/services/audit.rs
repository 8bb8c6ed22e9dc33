//! Append-only audit recording.
//!
//! Appends run synchronously after the state change they describe; a failed
//! append fails the whole operation rather than dropping the trail entry.

use std::sync::Arc;

use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{AuditEvent, NewAuditLog};
use crate::store::Store;

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn Store>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        event: AuditEvent,
        target_type: Option<&str>,
        target_id: Option<String>,
        actor_user_id: Option<Uuid>,
        details: serde_json::Value,
        request_id: Option<&str>,
    ) -> Result<(), AppError> {
        self.store
            .append_audit(&NewAuditLog {
                event_type: event.as_str(),
                target_type: target_type.map(str::to_string),
                target_id,
                actor_user_id,
                details,
                request_id: request_id.map(str::to_string),
            })
            .await
    }
}
