//! Custom domains for trust portals, managed through the Vercel projects API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;

use crate::config::VercelConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainVerification {
    #[serde(rename = "type")]
    pub record_type: String,
    pub domain: String,
    pub value: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainStatus {
    pub domain: String,
    pub verified: bool,
    pub misconfigured: bool,
    pub verification: Vec<DomainVerification>,
}

#[async_trait]
pub trait DomainProvider: Send + Sync {
    async fn add_domain(&self, domain: &str) -> Result<DomainStatus, AppError>;
    async fn remove_domain(&self, domain: &str) -> Result<(), AppError>;
    async fn domain_status(&self, domain: &str) -> Result<DomainStatus, AppError>;
}

/// Lowercase hostname with at least two labels. No scheme, port or path.
pub fn validate_domain(domain: &str) -> Result<(), AppError> {
    let invalid = |msg: &str| Err(AppError::bad_request(format!("Invalid domain: {}", msg)));

    if domain.is_empty() || domain.len() > 253 {
        return invalid("must be between 1 and 253 characters");
    }
    if domain.contains("://") || domain.contains('/') || domain.contains(':') {
        return invalid("provide a bare hostname without scheme, port or path");
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return invalid("must contain at least two labels");
    }
    for label in labels {
        if label.is_empty() || label.len() > 63 {
            return invalid("each label must be between 1 and 63 characters");
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return invalid("only lowercase letters, digits and hyphens are allowed");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return invalid("labels cannot start or end with a hyphen");
        }
    }
    Ok(())
}

// ==================== Vercel ====================

#[derive(Debug, Deserialize)]
struct ProjectDomain {
    name: String,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    verification: Vec<DomainVerification>,
}

#[derive(Debug, Deserialize)]
struct DomainConfig {
    #[serde(default)]
    misconfigured: bool,
}

#[derive(Debug, Deserialize)]
struct VercelErrorBody {
    error: VercelError,
}

#[derive(Debug, Deserialize)]
struct VercelError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn parse_project_domain(body: &str) -> Result<ProjectDomain, AppError> {
    serde_json::from_str(body)
        .map_err(|e| AppError::BadGateway(format!("Unexpected Vercel response: {}", e)))
}

fn parse_domain_config(body: &str) -> Result<DomainConfig, AppError> {
    serde_json::from_str(body)
        .map_err(|e| AppError::BadGateway(format!("Unexpected Vercel response: {}", e)))
}

fn upstream_error(status: StatusCode, body: &str) -> AppError {
    let detail = serde_json::from_str::<VercelErrorBody>(body)
        .ok()
        .map(|b| {
            format!(
                "{} ({})",
                b.error.message.unwrap_or_else(|| "unknown error".to_string()),
                b.error.code.unwrap_or_else(|| status.as_str().to_string())
            )
        })
        .unwrap_or_else(|| format!("HTTP {}", status));
    AppError::BadGateway(format!("Vercel: {}", detail))
}

pub struct VercelClient {
    client: Client,
    api_base: String,
    token: String,
    project_id: String,
    team_id: Option<String>,
}

impl VercelClient {
    pub fn new(
        api_base: &str,
        token: &str,
        project_id: &str,
        team_id: Option<&str>,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            project_id: project_id.to_string(),
            team_id: team_id.map(str::to_string),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.bearer_auth(&self.token);
        match &self.team_id {
            Some(team) => request.query(&[("teamId", team)]),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, String), AppError> {
        let response: Response = self.authorized(request).send().await.map_err(|e| {
            tracing::error!(error = %e, "Vercel request failed");
            AppError::BadGateway(format!("Vercel unreachable: {}", e))
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::BadGateway(format!("Failed to read Vercel response: {}", e)))?;
        Ok((status, body))
    }

    async fn fetch_config(&self, domain: &str) -> Result<DomainConfig, AppError> {
        let url = format!("{}/v6/domains/{}/config", self.api_base, domain);
        let (status, body) = self.send(self.client.get(url)).await?;
        if !status.is_success() {
            return Err(upstream_error(status, &body));
        }
        parse_domain_config(&body)
    }
}

#[async_trait]
impl DomainProvider for VercelClient {
    #[tracing::instrument(skip(self))]
    async fn add_domain(&self, domain: &str) -> Result<DomainStatus, AppError> {
        let url = format!("{}/v10/projects/{}/domains", self.api_base, self.project_id);
        let (status, body) = self
            .send(self.client.post(url).json(&serde_json::json!({ "name": domain })))
            .await?;
        if !status.is_success() {
            return Err(upstream_error(status, &body));
        }
        let added = parse_project_domain(&body)?;
        tracing::info!(domain = %added.name, verified = added.verified, "Domain added to Vercel project");
        Ok(DomainStatus {
            domain: added.name,
            verified: added.verified,
            misconfigured: !added.verified,
            verification: added.verification,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn remove_domain(&self, domain: &str) -> Result<(), AppError> {
        let url = format!(
            "{}/v9/projects/{}/domains/{}",
            self.api_base, self.project_id, domain
        );
        let (status, body) = self.send(self.client.delete(url)).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(upstream_error(status, &body))
    }

    #[tracing::instrument(skip(self))]
    async fn domain_status(&self, domain: &str) -> Result<DomainStatus, AppError> {
        let url = format!(
            "{}/v9/projects/{}/domains/{}",
            self.api_base, self.project_id, domain
        );
        let (status, body) = self.send(self.client.get(url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::not_found("Domain is not attached to the project"));
        }
        if !status.is_success() {
            return Err(upstream_error(status, &body));
        }
        let project_domain = parse_project_domain(&body)?;
        let config = self.fetch_config(domain).await?;

        Ok(DomainStatus {
            domain: project_domain.name,
            verified: project_domain.verified,
            misconfigured: config.misconfigured,
            verification: project_domain.verification,
        })
    }
}

/// Used when no Vercel credentials are configured.
pub struct DisabledDomainProvider;

#[async_trait]
impl DomainProvider for DisabledDomainProvider {
    async fn add_domain(&self, _domain: &str) -> Result<DomainStatus, AppError> {
        tracing::warn!("Custom domain requested but Vercel is not configured");
        Err(AppError::ServiceUnavailable)
    }

    async fn remove_domain(&self, domain: &str) -> Result<(), AppError> {
        tracing::debug!(domain = %domain, "Vercel not configured, skipping domain removal");
        Ok(())
    }

    async fn domain_status(&self, _domain: &str) -> Result<DomainStatus, AppError> {
        Err(AppError::ServiceUnavailable)
    }
}

pub fn build_domain_provider(config: &VercelConfig) -> Result<Arc<dyn DomainProvider>, AppError> {
    match (&config.token, &config.project_id) {
        (Some(token), Some(project)) => Ok(Arc::new(VercelClient::new(
            &config.api_base,
            token,
            project,
            config.team_id.as_deref(),
        )?)),
        _ => {
            tracing::info!("Vercel credentials not set, custom domains disabled");
            Ok(Arc::new(DisabledDomainProvider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_hostnames() {
        assert!(validate_domain("trust.example.com").is_ok());
        assert!(validate_domain("a-b.example.co.uk").is_ok());
    }

    #[test]
    fn rejects_malformed_domains() {
        for bad in [
            "",
            "localhost",
            "https://trust.example.com",
            "trust.example.com/path",
            "trust.example.com:443",
            "Trust.Example.com",
            "-trust.example.com",
            "trust-.example.com",
            "trust..example.com",
            "tru_st.example.com",
        ] {
            assert!(validate_domain(bad).is_err(), "{} should be rejected", bad);
        }
        let long_label = format!("{}.com", "a".repeat(64));
        assert!(validate_domain(&long_label).is_err());
    }

    #[test]
    fn parses_project_domain_payload() {
        let body = r#"{
            "name": "trust.acme.io",
            "apexName": "acme.io",
            "projectId": "prj_123",
            "verified": false,
            "verification": [
                {"type": "TXT", "domain": "_vercel.acme.io", "value": "vc-domain-verify=abc", "reason": "pending_domain_verification"}
            ]
        }"#;
        let domain = parse_project_domain(body).unwrap();
        assert_eq!(domain.name, "trust.acme.io");
        assert!(!domain.verified);
        assert_eq!(domain.verification.len(), 1);
        assert_eq!(domain.verification[0].record_type, "TXT");
        assert_eq!(domain.verification[0].value, "vc-domain-verify=abc");
    }

    #[test]
    fn verification_defaults_to_empty() {
        let domain = parse_project_domain(r#"{"name":"trust.acme.io","verified":true}"#).unwrap();
        assert!(domain.verified);
        assert!(domain.verification.is_empty());
        let config = parse_domain_config(r#"{"configuredBy":"CNAME","misconfigured":false}"#).unwrap();
        assert!(!config.misconfigured);
    }

    #[test]
    fn upstream_errors_become_bad_gateway() {
        let err = upstream_error(
            StatusCode::CONFLICT,
            r#"{"error":{"code":"domain_already_in_use","message":"Domain is in use"}}"#,
        );
        match err {
            AppError::BadGateway(msg) => {
                assert!(msg.contains("Domain is in use"));
                assert!(msg.contains("domain_already_in_use"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(matches!(
            upstream_error(StatusCode::INTERNAL_SERVER_ERROR, "<html>"),
            AppError::BadGateway(_)
        ));
    }

    #[test]
    fn unconfigured_vercel_uses_disabled_provider() {
        let config = crate::config::tests::test_config().vercel;
        assert!(!config.is_configured());
        assert!(build_domain_provider(&config).is_ok());
    }
}
