//! Access requests, NDA agreements and grants for the trust portal.
//!
//! Lifecycle: a request starts `under_review` and is approved, denied or
//! canceled. Approval creates a `pending` NDA agreement; signing it marks the
//! agreement `signed` and issues an `active` grant. Revoking the grant voids
//! every agreement attached to it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestStatus {
    UnderReview,
    Approved,
    Denied,
    Canceled,
}

impl AccessRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRequestStatus::UnderReview => "under_review",
            AccessRequestStatus::Approved => "approved",
            AccessRequestStatus::Denied => "denied",
            AccessRequestStatus::Canceled => "canceled",
        }
    }

    /// Review decisions are only valid while the request is under review.
    pub fn ensure_under_review(self, action: &str) -> Result<(), AppError> {
        if self == AccessRequestStatus::UnderReview {
            Ok(())
        } else {
            Err(AppError::bad_request(format!(
                "Cannot {} a request that is {}",
                action,
                self.as_str()
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NdaStatus {
    Pending,
    Signed,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrustAccessRequest {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub purpose: Option<String>,
    pub requested_duration_days: Option<i32>,
    pub status: AccessRequestStatus,
    pub reviewer_member_id: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub decision_reason: Option<String>,
    pub requester_ip: Option<String>,
    pub requester_user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrustAccessRequest {
    /// Grant length for an approval: explicit override, else what the requester
    /// asked for, else the default. Always within `1..=max_days`.
    pub fn grant_duration_days(&self, override_days: Option<i32>, default_days: i32, max_days: i32) -> i32 {
        override_days
            .or(self.requested_duration_days)
            .unwrap_or(default_days)
            .clamp(1, max_days.max(1))
    }
}

/// What a valid NDA link currently allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdaLinkState {
    Signable,
    AlreadySigned,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrustNdaAgreement {
    pub id: Uuid,
    pub org_id: Uuid,
    pub access_request_id: Uuid,
    pub grant_id: Option<Uuid>,
    pub status: NdaStatus,
    #[serde(skip)]
    pub sign_token: String,
    pub sign_token_expires_at: DateTime<Utc>,
    pub signer_name: Option<String>,
    pub signer_email: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signer_ip: Option<String>,
    pub signer_user_agent: Option<String>,
    pub pdf_template_version: Option<String>,
    #[serde(skip)]
    pub pdf_signed_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrustNdaAgreement {
    /// Classify a sign link. Signed agreements stay viewable after the link
    /// expires so that re-opening the email still shows the outcome.
    pub fn link_state(&self, now: DateTime<Utc>) -> Result<NdaLinkState, AppError> {
        match self.status {
            NdaStatus::Signed => Ok(NdaLinkState::AlreadySigned),
            NdaStatus::Void => Err(AppError::bad_request("This NDA has been revoked")),
            NdaStatus::Pending if now >= self.sign_token_expires_at => {
                Err(AppError::bad_request("NDA signing link has expired"))
            }
            NdaStatus::Pending => Ok(NdaLinkState::Signable),
        }
    }

    /// Like [`link_state`](Self::link_state) but only accepts pending, unexpired links.
    pub fn ensure_signable(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.link_state(now)? {
            NdaLinkState::Signable => Ok(()),
            NdaLinkState::AlreadySigned => Err(AppError::bad_request("NDA has already been signed")),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrustAccessGrant {
    pub id: Uuid,
    pub org_id: Uuid,
    pub access_request_id: Uuid,
    pub subject_email: String,
    pub status: GrantStatus,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub issued_by_member_id: Option<Uuid>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by_member_id: Option<Uuid>,
    pub revoke_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrustAccessGrant {
    pub fn is_unexpired_active(&self, now: DateTime<Utc>) -> bool {
        self.status == GrantStatus::Active && now < self.expires_at
    }

    /// Gate for every token-authenticated read.
    pub fn ensure_token_usable(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.status == GrantStatus::Revoked {
            return Err(AppError::forbidden("Access has been revoked"));
        }
        if now >= self.expires_at {
            return Err(AppError::unauthorized("Access grant has expired"));
        }
        if now >= self.access_token_expires_at {
            return Err(AppError::unauthorized(
                "Access link has expired, request a new one from the trust portal",
            ));
        }
        Ok(())
    }

    /// The grant is still live but the link in the last email is not.
    pub fn access_token_needs_rotation(&self, now: DateTime<Utc>) -> bool {
        self.is_unexpired_active(now) && now >= self.access_token_expires_at
    }

    pub fn ensure_active(&self) -> Result<(), AppError> {
        if self.status == GrantStatus::Active {
            Ok(())
        } else {
            Err(AppError::bad_request("Grant is not active"))
        }
    }
}

/// Access tokens live for `ttl_hours` but never past the grant itself.
pub fn access_token_expiry(now: DateTime<Utc>, ttl_hours: i64, grant_expires_at: DateTime<Utc>) -> DateTime<Utc> {
    (now + Duration::hours(ttl_hours)).min(grant_expires_at)
}
