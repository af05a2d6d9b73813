//! Trust access workflow payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    AccessRequestStatus, GrantStatus, NdaStatus, Policy, TrustAccessGrant, TrustAccessRequest,
    TrustDocument, TrustNdaAgreement, TrustResource,
};

// ==================== Public ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccessRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    #[validate(length(max = 200))]
    pub job_title: Option<String>,
    #[validate(length(max = 2000))]
    pub purpose: Option<String>,
    #[validate(range(min = 1, max = 365, message = "Duration must be between 1 and 365 days"))]
    pub requested_duration_days: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestOutcome {
    UnderReview,
    AlreadyPending,
    AlreadyApproved,
}

impl AccessRequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRequestOutcome::UnderReview => "under_review",
            AccessRequestOutcome::AlreadyPending => "already_pending",
            AccessRequestOutcome::AlreadyApproved => "already_approved",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessRequestResponse {
    pub status: AccessRequestOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReclaimRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NdaDetailsResponse {
    pub id: Uuid,
    pub status: NdaStatus,
    pub organization_name: String,
    pub requester_name: String,
    pub requester_email: String,
    pub requester_company: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub grant_duration_days: i32,
    pub template_version: String,
    pub content: String,
    /// Set once signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignNdaRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub accept: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignNdaResponse {
    pub grant_id: Uuid,
    pub access_url: String,
    pub expires_at: DateTime<Utc>,
    pub already_signed: bool,
}

/// Grant details as seen by the holder of an access link.
#[derive(Debug, Serialize, Deserialize)]
pub struct GrantAccessResponse {
    pub grant_id: Uuid,
    pub organization_name: String,
    pub friendly_url: String,
    pub subject_email: String,
    pub status: GrantStatus,
    pub expires_at: DateTime<Utc>,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct GrantDocumentsResponse {
    pub documents: Vec<TrustDocument>,
    pub resources: Vec<TrustResource>,
}

/// Policy listing for grantees. The content is only available as PDF.
#[derive(Debug, Serialize, Deserialize)]
pub struct SharedPolicy {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<Policy> for SharedPolicy {
    fn from(policy: Policy) -> Self {
        Self {
            id: policy.id,
            name: policy.name,
            description: policy.description,
            updated_at: policy.updated_at,
        }
    }
}

// ==================== Admin ====================

#[derive(Debug, Deserialize)]
pub struct RequestListParams {
    pub status: Option<AccessRequestStatus>,
}

#[derive(Debug, Deserialize)]
pub struct GrantListParams {
    pub status: Option<GrantStatus>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ApproveRequest {
    #[validate(range(min = 1, message = "Duration must be at least one day"))]
    pub duration_days: Option<i32>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct DenyRequest {
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RevokeGrantRequest {
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestDetailResponse {
    #[serde(flatten)]
    pub request: TrustAccessRequest,
    pub nda_agreements: Vec<TrustNdaAgreement>,
    pub grant: Option<TrustAccessGrant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_snake_case() {
        let body = AccessRequestResponse {
            status: AccessRequestOutcome::AlreadyApproved,
            request_id: None,
            message: "ok".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "already_approved");
        assert!(json.get("request_id").is_none());
    }

    #[test]
    fn access_request_validates_email_and_duration() {
        let req: CreateAccessRequest = serde_json::from_str(
            r#"{"name":"Ada","email":"ada-at-example","requested_duration_days":0}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
        assert!(errors.field_errors().contains_key("requested_duration_days"));
    }
}
