//! Members, their roles, and invitations.
//!
//! Roles are a typed set persisted as a `TEXT[]` column. Older exports carry
//! them as a comma-separated string ("admin,owner"); [`RoleSet::parse_legacy`]
//! is the single place that format is understood.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Auditor,
    Employee,
    Contractor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Auditor => "auditor",
            Role::Employee => "employee",
            Role::Contractor => "contractor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "auditor" => Ok(Role::Auditor),
            "employee" => Ok(Role::Employee),
            "contractor" => Ok(Role::Contractor),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Deduplicated, ordered set of roles. Serialized as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new<I: IntoIterator<Item = Role>>(roles: I) -> Self {
        RoleSet(roles.into_iter().collect())
    }

    pub fn single(role: Role) -> Self {
        Self::new([role])
    }

    /// Parse the legacy comma-separated representation.
    pub fn parse_legacy(raw: &str) -> Result<Self, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Role::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(RoleSet)
    }

    /// Parse the database column. Unknown values are dropped with a warning so
    /// a stray value cannot lock a member out entirely.
    pub fn from_db(values: &[String]) -> Self {
        RoleSet(
            values
                .iter()
                .filter_map(|v| match v.parse() {
                    Ok(role) => Some(role),
                    Err(e) => {
                        tracing::warn!(value = %v, error = %e, "Ignoring unknown role value");
                        None
                    }
                })
                .collect(),
        )
    }

    pub fn to_db(&self) -> Vec<String> {
        self.0.iter().map(|r| r.as_str().to_string()).collect()
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn has_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.0.contains(r))
    }

    /// Owners and admins may administer the organization.
    pub fn is_privileged(&self) -> bool {
        self.has_any(&[Role::Owner, Role::Admin])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(Role::as_str).collect();
        f.write_str(&joined.join(","))
    }
}

/// Raw member row joined with its user.
#[derive(Debug, Clone, FromRow)]
pub struct MemberRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub roles: Vec<String>,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Member {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub roles: RoleSet,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            id: row.id,
            org_id: row.org_id,
            user_id: row.user_id,
            email: row.email,
            name: row.name,
            roles: RoleSet::from_db(&row.roles),
            department: row.department,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

impl Member {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvitationRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub token_hash: String,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub invited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Invitation {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub roles: RoleSet,
    #[serde(skip)]
    pub token_hash: String,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub invited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl From<InvitationRow> for Invitation {
    fn from(row: InvitationRow) -> Self {
        Invitation {
            id: row.id,
            org_id: row.org_id,
            email: row.email,
            roles: RoleSet::from_db(&row.roles),
            token_hash: row.token_hash,
            status: row.status,
            expires_at: row.expires_at,
            invited_by: row.invited_by,
            created_at: row.created_at,
            accepted_at: row.accepted_at,
        }
    }
}

impl Invitation {
    /// Pending and not yet expired.
    pub fn is_acceptable(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn parse_legacy_handles_whitespace_and_duplicates() {
        let roles = RoleSet::parse_legacy(" admin, owner,admin ,").unwrap();
        assert_eq!(roles, RoleSet::new([Role::Owner, Role::Admin]));
        assert_eq!(roles.to_string(), "owner,admin");
        assert!(roles.is_privileged());
    }

    #[test]
    fn parse_legacy_rejects_unknown_roles() {
        assert!(RoleSet::parse_legacy("admin,superuser").is_err());
        assert!(RoleSet::parse_legacy("").unwrap().is_empty());
    }

    #[test]
    fn from_db_skips_unknown_values() {
        let roles = RoleSet::from_db(&["employee".to_string(), "ghost".to_string()]);
        assert_eq!(roles, RoleSet::single(Role::Employee));
        assert!(!roles.is_privileged());
        assert_eq!(roles.to_db(), vec!["employee".to_string()]);
    }

    #[test]
    fn role_set_serializes_as_array() {
        let roles = RoleSet::new([Role::Auditor, Role::Owner]);
        assert_eq!(
            serde_json::to_string(&roles).unwrap(),
            r#"["owner","auditor"]"#
        );
        let parsed: RoleSet = serde_json::from_str(r#"["admin","admin"]"#).unwrap();
        assert_eq!(parsed, RoleSet::single(Role::Admin));
    }

    #[test]
    fn invitation_acceptability() {
        let now = Utc::now();
        let mut invitation = Invitation {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            email: "new@example.com".to_string(),
            roles: RoleSet::single(Role::Employee),
            token_hash: "hash".to_string(),
            status: InvitationStatus::Pending,
            expires_at: now + Duration::days(7),
            invited_by: None,
            created_at: now,
            accepted_at: None,
        };
        assert!(invitation.is_acceptable(now));
        assert!(!invitation.is_acceptable(now + Duration::days(8)));
        invitation.status = InvitationStatus::Revoked;
        assert!(!invitation.is_acceptable(now));
    }
}
