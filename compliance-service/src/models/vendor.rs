use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VendorCategory {
    Cloud,
    Infrastructure,
    SoftwareAsAService,
    Finance,
    Marketing,
    SalesAndCrm,
    HrAndPayroll,
    Security,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VendorStatus {
    NotAssessed,
    InProgress,
    Assessed,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vendor {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: String,
    pub category: VendorCategory,
    pub status: VendorStatus,
    pub website: Option<String>,
    pub inherent_probability: i16,
    pub inherent_impact: i16,
    pub residual_probability: i16,
    pub residual_impact: i16,
    pub assignee_id: Option<Uuid>,
    pub show_on_trust_portal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
