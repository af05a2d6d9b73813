use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Draft,
    Published,
}

/// Policy document. `content` is a rich-text tree (see `pdf::policy::RichNode`).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Policy {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: PolicyStatus,
    pub content: serde_json::Value,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    pub fn is_shareable(&self) -> bool {
        self.status == PolicyStatus::Published && !self.is_archived
    }
}
