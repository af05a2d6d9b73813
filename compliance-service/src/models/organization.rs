//! Organization (tenant) and user models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant owning every other record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Derive a URL-safe slug from a display name.
    ///
    /// Runs of non-alphanumerics collapse into one hyphen; an empty result
    /// falls back to "org".
    pub fn slugify(name: &str) -> String {
        let mut slug = String::with_capacity(name.len());
        let mut pending_hyphen = false;
        for ch in name.chars() {
            if ch.is_ascii_alphanumeric() {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(ch.to_ascii_lowercase());
            } else {
                pending_hyphen = true;
            }
        }
        slug.truncate(48);
        let slug = slug.trim_end_matches('-').to_string();
        if slug.is_empty() {
            "org".to_string()
        } else {
            slug
        }
    }
}

/// Identity known from a verified session. Upserted on first use.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(Organization::slugify("Acme, Inc."), "acme-inc");
        assert_eq!(Organization::slugify("  Big   Data  Co "), "big-data-co");
        assert_eq!(Organization::slugify("Ünïcode Ltd"), "n-code-ltd");
        assert_eq!(Organization::slugify("!!!"), "org");
    }
}
