//! Trust portal settings and published artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrustStatus {
    Draft,
    Published,
}

/// Compliance frameworks an organization can advertise on its portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum Framework {
    #[serde(rename = "iso27001")]
    #[sqlx(rename = "iso27001")]
    Iso27001,
    #[serde(rename = "iso42001")]
    #[sqlx(rename = "iso42001")]
    Iso42001,
    #[serde(rename = "gdpr")]
    #[sqlx(rename = "gdpr")]
    Gdpr,
    #[serde(rename = "hipaa")]
    #[sqlx(rename = "hipaa")]
    Hipaa,
    #[serde(rename = "soc2_type1")]
    #[sqlx(rename = "soc2_type1")]
    Soc2Type1,
    #[serde(rename = "soc2_type2")]
    #[sqlx(rename = "soc2_type2")]
    Soc2Type2,
    #[serde(rename = "pci_dss")]
    #[sqlx(rename = "pci_dss")]
    PciDss,
    #[serde(rename = "nen7510")]
    #[sqlx(rename = "nen7510")]
    Nen7510,
    #[serde(rename = "iso9001")]
    #[sqlx(rename = "iso9001")]
    Iso9001,
}

impl Framework {
    pub const ALL: [Framework; 9] = [
        Framework::Iso27001,
        Framework::Iso42001,
        Framework::Gdpr,
        Framework::Hipaa,
        Framework::Soc2Type1,
        Framework::Soc2Type2,
        Framework::PciDss,
        Framework::Nen7510,
        Framework::Iso9001,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Iso27001 => "iso27001",
            Framework::Iso42001 => "iso42001",
            Framework::Gdpr => "gdpr",
            Framework::Hipaa => "hipaa",
            Framework::Soc2Type1 => "soc2_type1",
            Framework::Soc2Type2 => "soc2_type2",
            Framework::PciDss => "pci_dss",
            Framework::Nen7510 => "nen7510",
            Framework::Iso9001 => "iso9001",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Framework::Iso27001 => "ISO 27001",
            Framework::Iso42001 => "ISO 42001",
            Framework::Gdpr => "GDPR",
            Framework::Hipaa => "HIPAA",
            Framework::Soc2Type1 => "SOC 2 Type I",
            Framework::Soc2Type2 => "SOC 2 Type II",
            Framework::PciDss => "PCI DSS",
            Framework::Nen7510 => "NEN 7510",
            Framework::Iso9001 => "ISO 9001",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Framework::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown framework: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FrameworkStatus {
    Started,
    InProgress,
    Compliant,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Trust {
    pub org_id: Uuid,
    pub friendly_url: String,
    pub status: TrustStatus,
    pub contact_email: Option<String>,
    pub domain: Option<String>,
    pub domain_verified: bool,
    pub overview_title: Option<String>,
    pub overview_content: Option<String>,
    pub show_overview: bool,
    pub updated_at: DateTime<Utc>,
}

impl Trust {
    pub fn is_published(&self) -> bool {
        self.status == TrustStatus::Published
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrustFrameworkSetting {
    pub org_id: Uuid,
    pub framework: Framework,
    pub enabled: bool,
    pub status: FrameworkStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrustCustomLink {
    pub id: Uuid,
    pub org_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub order_index: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Framework certificate (one per org and framework).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrustResource {
    pub id: Uuid,
    pub org_id: Uuid,
    pub framework: Framework,
    pub file_name: String,
    pub file_size: i64,
    #[serde(skip)]
    pub s3_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrustDocument {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_size: i64,
    #[serde(skip)]
    pub s3_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// First path segments under `/v1/trust-access` that belong to fixed routes.
pub const RESERVED_FRIENDLY_URLS: [&str; 3] = ["admin", "nda", "access"];

/// Friendly URLs are lowercase slugs: 3-63 chars of `[a-z0-9-]`, no edge hyphens.
pub fn validate_friendly_url(value: &str) -> Result<(), String> {
    if value.len() < 3 || value.len() > 63 {
        return Err("Friendly URL must be between 3 and 63 characters".to_string());
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Friendly URL may only contain lowercase letters, digits and hyphens".to_string());
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err("Friendly URL cannot start or end with a hyphen".to_string());
    }
    if RESERVED_FRIENDLY_URLS.contains(&value) {
        return Err(format!("Friendly URL '{}' is reserved", value));
    }
    Ok(())
}

/// Seed for a new portal's friendly URL. Slugs that are too short or
/// reserved get a `-trust` suffix.
pub fn friendly_url_base(slug: &str) -> String {
    if validate_friendly_url(slug).is_ok() {
        slug.to_string()
    } else {
        format!("{}-trust", slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_names_round_trip_through_strings() {
        for framework in Framework::ALL {
            assert_eq!(framework.as_str().parse::<Framework>(), Ok(framework));
            let json = serde_json::to_string(&framework).unwrap();
            assert_eq!(json, format!("\"{}\"", framework.as_str()));
        }
        assert!("soc3".parse::<Framework>().is_err());
    }

    #[test]
    fn friendly_url_rules() {
        assert!(validate_friendly_url("acme-trust").is_ok());
        assert!(validate_friendly_url("ab").is_err());
        assert!(validate_friendly_url("Acme").is_err());
        assert!(validate_friendly_url("-acme").is_err());
        assert!(validate_friendly_url("acme_trust").is_err());
    }

    #[test]
    fn friendly_url_cannot_shadow_fixed_routes() {
        for reserved in RESERVED_FRIENDLY_URLS {
            assert!(validate_friendly_url(reserved).is_err());
        }
        assert!(validate_friendly_url("admin-trust").is_ok());
        assert!(validate_friendly_url("access-co").is_ok());

        assert_eq!(friendly_url_base("admin"), "admin-trust");
        assert_eq!(friendly_url_base("nda"), "nda-trust");
        assert_eq!(friendly_url_base("access"), "access-trust");
        assert_eq!(friendly_url_base("acme"), "acme");
    }
}
