pub mod people;
pub mod registers;
pub mod trust_access;
pub mod trust_portal;

use serde::{Deserialize, Serialize};

pub use people::{
    AcceptInvitationRequest, ApiKeyCreatedResponse, AuditLogParams, CreateApiKeyRequest,
    CreateInvitationRequest, CreateOrganizationRequest, UpdateMemberRequest,
    UpdateOrganizationRequest,
};
pub use registers::{
    CreatePolicyRequest, CreateRiskRequest, CreateTaskRequest, CreateVendorRequest, ListParams,
    RiskResponse, UpdatePolicyRequest, UpdateRiskRequest, UpdateTaskRequest, UpdateVendorRequest,
};
pub use trust_access::{
    AccessRequestOutcome, AccessRequestResponse, ApproveRequest, CreateAccessRequest, DenyRequest,
    GrantAccessResponse, GrantDocumentsResponse, GrantListParams, NdaDetailsResponse,
    ReclaimRequest, RequestDetailResponse, RequestListParams, RevokeGrantRequest, SharedPolicy,
    SignNdaRequest, SignNdaResponse,
};
pub use trust_portal::{
    CreateLinkRequest, DomainStatusParams, PublicTrustPortal, ReorderLinksRequest, SetDomainRequest,
    SignedUrlResponse, UpdateFrameworkRequest, UpdateLinkRequest, UpdateOverviewRequest,
    UpdateTrustSettingsRequest, UploadDocumentRequest, UploadResourceRequest,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
