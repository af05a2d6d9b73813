use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    Approved,
    Denied,
    Canceled,
    Signed,
    Revoked,
    Resent,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
            AuditAction::Approved => "approved",
            AuditAction::Denied => "denied",
            AuditAction::Canceled => "canceled",
            AuditAction::Signed => "signed",
            AuditAction::Revoked => "revoked",
            AuditAction::Resent => "resent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub org_id: Uuid,
    pub member_id: Option<Uuid>,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub description: String,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit entry to be written inside the caller's transaction.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub org_id: Uuid,
    pub member_id: Option<Uuid>,
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub description: String,
    pub data: Option<serde_json::Value>,
}

impl NewAuditLog {
    pub fn new(
        org_id: Uuid,
        entity_type: &'static str,
        entity_id: Uuid,
        action: AuditAction,
        description: impl Into<String>,
    ) -> Self {
        Self {
            org_id,
            member_id: None,
            entity_type,
            entity_id,
            action,
            description: description.into(),
            data: None,
        }
    }

    pub fn by(mut self, member_id: Option<Uuid>) -> Self {
        self.member_id = member_id;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
