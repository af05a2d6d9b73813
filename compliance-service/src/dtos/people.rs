use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::Role;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 120, message = "Organization name is required"))]
    pub name: String,

    #[validate(url(message = "Website must be a valid URL"))]
    pub website: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 120, message = "Organization name cannot be empty"))]
    pub name: Option<String>,

    #[validate(url(message = "Website must be a valid URL"))]
    pub website: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMemberRequest {
    #[validate(length(min = 1, message = "A member needs at least one role"))]
    pub roles: Option<Vec<Role>>,

    #[validate(length(max = 120))]
    pub department: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvitationRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "At least one role is required"))]
    pub roles: Vec<Role>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 100, message = "Key name is required"))]
    pub name: String,
}

/// The plaintext key is only ever returned here.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyCreatedResponse {
    pub id: Uuid,
    pub name: String,
    pub key: String,
    pub key_prefix: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogParams {
    pub entity_type: String,
    pub entity_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invitation_requires_email_and_role() {
        let req: CreateInvitationRequest =
            serde_json::from_str(r#"{"email":"not-an-email","roles":[]}"#).unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("roles"));
    }

    #[test]
    fn unknown_roles_fail_to_deserialize() {
        let parsed = serde_json::from_str::<CreateInvitationRequest>(
            r#"{"email":"a@example.com","roles":["superuser"]}"#,
        );
        assert!(parsed.is_err());
    }
}
