pub mod api_key;
pub mod audit_log;
pub mod member;
pub mod organization;
pub mod policy;
pub mod risk;
pub mod task;
pub mod trust;
pub mod trust_access;
pub mod vendor;

pub use api_key::ApiKey;
pub use audit_log::{AuditAction, AuditLog, NewAuditLog};
pub use member::{Invitation, InvitationRow, InvitationStatus, Member, MemberRow, Role, RoleSet};
pub use organization::{Organization, User};
pub use policy::{Policy, PolicyStatus};
pub use risk::{Risk, RiskCategory, RiskStatus, TreatmentStrategy};
pub use task::{Task, TaskFrequency, TaskStatus};
pub use trust::{
    Framework, FrameworkStatus, Trust, TrustCustomLink, TrustDocument, TrustFrameworkSetting,
    TrustResource, TrustStatus,
};
pub use trust::{friendly_url_base, validate_friendly_url};
pub use trust_access::{
    access_token_expiry, AccessRequestStatus, GrantStatus, NdaLinkState, NdaStatus, TrustAccessGrant,
    TrustAccessRequest, TrustNdaAgreement,
};
pub use vendor::{Vendor, VendorCategory, VendorStatus};
