use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Framework, FrameworkStatus, TrustStatus, VendorCategory};

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTrustSettingsRequest {
    pub status: Option<TrustStatus>,
    pub friendly_url: Option<String>,
    #[validate(email(message = "Invalid contact email"))]
    pub contact_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFrameworkRequest {
    pub enabled: bool,
    pub status: Option<FrameworkStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOverviewRequest {
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 20000))]
    pub content: Option<String>,
    pub show: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLinkRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(url(message = "Link must be a valid URL"))]
    pub url: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLinkRequest {
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(url(message = "Link must be a valid URL"))]
    pub url: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReorderLinksRequest {
    #[validate(length(min = 1, message = "Provide the link ids in display order"))]
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetDomainRequest {
    #[validate(length(min = 1, max = 253, message = "Domain is required"))]
    pub domain: String,
}

#[derive(Debug, Deserialize)]
pub struct DomainStatusParams {
    pub domain: String,
}

/// Framework certificate upload. `file_data` is base64, optionally as a data URL.
#[derive(Debug, Deserialize, Validate)]
pub struct UploadResourceRequest {
    pub framework: Framework,
    #[validate(length(min = 1, max = 255, message = "File name is required"))]
    pub file_name: String,
    #[validate(length(min = 1, message = "File type is required"))]
    pub file_type: String,
    #[validate(length(min = 1, message = "File data is required"))]
    pub file_data: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UploadDocumentRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 255, message = "File name is required"))]
    pub file_name: String,
    #[validate(length(min = 1, message = "File type is required"))]
    pub file_type: String,
    #[validate(length(min = 1, message = "File data is required"))]
    pub file_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

// ==================== Public view ====================

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicTrustPortal {
    pub organization_name: String,
    pub friendly_url: String,
    pub contact_email: Option<String>,
    pub overview: Option<PublicOverview>,
    pub frameworks: Vec<PublicFramework>,
    pub links: Vec<PublicLink>,
    pub vendors: Vec<PublicVendor>,
    pub documents: Vec<PublicDocument>,
    pub resources: Vec<PublicResource>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicOverview {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicFramework {
    pub framework: Framework,
    pub label: String,
    pub status: FrameworkStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicLink {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicVendor {
    pub name: String,
    pub website: Option<String>,
    pub category: VendorCategory,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicDocument {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicResource {
    pub framework: Framework,
    pub file_name: String,
}
