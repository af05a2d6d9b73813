use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Customer,
    Governance,
    Operations,
    Other,
    People,
    Regulatory,
    Reporting,
    Resilience,
    Technology,
    VendorManagement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    Open,
    Pending,
    Closed,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TreatmentStrategy {
    Accept,
    Avoid,
    Mitigate,
    Transfer,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Risk {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: RiskCategory,
    pub department: Option<String>,
    pub status: RiskStatus,
    /// 1 (rare) to 5 (almost certain).
    pub likelihood: i16,
    /// 1 (insignificant) to 5 (severe).
    pub impact: i16,
    pub residual_likelihood: i16,
    pub residual_impact: i16,
    pub treatment_strategy: TreatmentStrategy,
    pub treatment_description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Risk {
    pub fn inherent_score(&self) -> i16 {
        self.likelihood * self.impact
    }

    pub fn residual_score(&self) -> i16 {
        self.residual_likelihood * self.residual_impact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_multiply_scales() {
        let now = Utc::now();
        let risk = Risk {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            title: "Laptop theft".to_string(),
            description: String::new(),
            category: RiskCategory::Technology,
            department: None,
            status: RiskStatus::Open,
            likelihood: 4,
            impact: 5,
            residual_likelihood: 2,
            residual_impact: 3,
            treatment_strategy: TreatmentStrategy::Mitigate,
            treatment_description: Some("Full disk encryption".to_string()),
            assignee_id: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(risk.inherent_score(), 20);
        assert_eq!(risk.residual_score(), 6);
    }

    #[test]
    fn category_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&RiskCategory::VendorManagement).unwrap(),
            "\"vendor_management\""
        );
    }
}
