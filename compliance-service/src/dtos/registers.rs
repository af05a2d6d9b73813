//! Requests for the risk, vendor, task and policy registers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Risk, RiskCategory, RiskStatus, TaskFrequency, TaskStatus, TreatmentStrategy, VendorCategory,
    VendorStatus,
};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct ListParams<S> {
    pub status: Option<S>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl<S> ListParams<S> {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

// ==================== Risks ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRiskRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<RiskCategory>,
    pub department: Option<String>,
    pub status: Option<RiskStatus>,
    #[validate(range(min = 1, max = 5))]
    pub likelihood: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub impact: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub residual_likelihood: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub residual_impact: Option<i16>,
    pub treatment_strategy: Option<TreatmentStrategy>,
    pub treatment_description: Option<String>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRiskRequest {
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<RiskCategory>,
    pub department: Option<String>,
    pub status: Option<RiskStatus>,
    #[validate(range(min = 1, max = 5))]
    pub likelihood: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub impact: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub residual_likelihood: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub residual_impact: Option<i16>,
    pub treatment_strategy: Option<TreatmentStrategy>,
    pub treatment_description: Option<String>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RiskResponse {
    #[serde(flatten)]
    pub risk: Risk,
    pub inherent_score: i16,
    pub residual_score: i16,
}

impl From<Risk> for RiskResponse {
    fn from(risk: Risk) -> Self {
        Self {
            inherent_score: risk.inherent_score(),
            residual_score: risk.residual_score(),
            risk,
        }
    }
}

// ==================== Vendors ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVendorRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<VendorCategory>,
    pub status: Option<VendorStatus>,
    #[validate(url(message = "Website must be a valid URL"))]
    pub website: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub inherent_probability: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub inherent_impact: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub residual_probability: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub residual_impact: Option<i16>,
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub show_on_trust_portal: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateVendorRequest {
    #[validate(length(min = 1, max = 200, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<VendorCategory>,
    pub status: Option<VendorStatus>,
    #[validate(url(message = "Website must be a valid URL"))]
    pub website: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub inherent_probability: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub inherent_impact: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub residual_probability: Option<i16>,
    #[validate(range(min = 1, max = 5))]
    pub residual_impact: Option<i16>,
    pub assignee_id: Option<Uuid>,
    pub show_on_trust_portal: Option<bool>,
}

// ==================== Tasks ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Option<TaskStatus>,
    pub frequency: Option<TaskFrequency>,
    pub department: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub frequency: Option<TaskFrequency>,
    pub department: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

// ==================== Policies ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePolicyRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    /// Rich-text document; an empty doc when omitted.
    pub content: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePolicyRequest {
    #[validate(length(min = 1, max = 200, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<serde_json::Value>,
    pub is_archived: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_clamp_paging() {
        let params: ListParams<RiskStatus> = ListParams {
            status: None,
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(params.limit(), MAX_PAGE_SIZE);
        assert_eq!(params.offset(), 0);

        let defaults: ListParams<RiskStatus> = ListParams {
            status: Some(RiskStatus::Open),
            limit: None,
            offset: None,
        };
        assert_eq!(defaults.limit(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn risk_scales_are_bounded() {
        let req: CreateRiskRequest =
            serde_json::from_str(r#"{"title":"Laptop theft","likelihood":6,"impact":0}"#).unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("likelihood"));
        assert!(errors.field_errors().contains_key("impact"));
    }
}
