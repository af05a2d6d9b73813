//! Trust portal administration and the public portal view.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::TrustConfig;
use crate::dtos::trust_portal::{
    PublicDocument, PublicFramework, PublicLink, PublicOverview, PublicResource, PublicVendor,
};
use crate::dtos::{
    CreateLinkRequest, PublicTrustPortal, SignedUrlResponse, UpdateFrameworkRequest,
    UpdateLinkRequest, UpdateOverviewRequest, UpdateTrustSettingsRequest, UploadDocumentRequest,
    UploadResourceRequest,
};
use crate::models::{
    validate_friendly_url, Framework, Trust, TrustCustomLink, TrustDocument, TrustFrameworkSetting,
    TrustResource, Vendor,
};
use crate::services::database::{Database, TrustSettingsUpdate};
use crate::services::domains::{validate_domain, DomainProvider, DomainStatus};
use crate::services::storage::{delete_best_effort, document_key, resource_key, Storage};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Decode a base64 payload, accepting a `data:<type>;base64,` prefix.
pub fn decode_upload(file_data: &str, max_bytes: usize) -> Result<Vec<u8>, AppError> {
    let encoded = match file_data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => file_data,
    };
    let encoded: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    // Reject before decoding when the encoded form is already too large.
    if encoded.len() / 4 * 3 > max_bytes + 2 {
        return Err(AppError::PayloadTooLarge(anyhow::anyhow!(
            "File exceeds the {} byte limit",
            max_bytes
        )));
    }
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| AppError::bad_request("File data is not valid base64"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("File is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::PayloadTooLarge(anyhow::anyhow!(
            "File exceeds the {} byte limit",
            max_bytes
        )));
    }
    Ok(bytes)
}

pub fn ensure_pdf(file_type: &str, bytes: &[u8]) -> Result<(), AppError> {
    if !file_type.eq_ignore_ascii_case("application/pdf") || !bytes.starts_with(PDF_MAGIC) {
        return Err(AppError::bad_request("Only PDF files are accepted"));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct TrustPortalService {
    db: Database,
    storage: Arc<dyn Storage>,
    domains: Arc<dyn DomainProvider>,
    config: TrustConfig,
}

impl TrustPortalService {
    pub fn new(
        db: Database,
        storage: Arc<dyn Storage>,
        domains: Arc<dyn DomainProvider>,
        config: TrustConfig,
    ) -> Self {
        Self {
            db,
            storage,
            domains,
            config,
        }
    }

    pub async fn settings(&self, org_id: Uuid) -> Result<Trust, AppError> {
        self.db
            .find_trust(org_id)
            .await?
            .ok_or_else(|| AppError::not_found("Trust portal not found"))
    }

    #[tracing::instrument(skip(self, req))]
    pub async fn update_settings(&self, org_id: Uuid, req: &UpdateTrustSettingsRequest) -> Result<Trust, AppError> {
        let friendly_url = req.friendly_url.as_deref().map(|u| u.trim().to_lowercase());
        if let Some(url) = &friendly_url {
            validate_friendly_url(url).map_err(AppError::bad_request)?;
        }
        let update = TrustSettingsUpdate {
            status: req.status,
            friendly_url: friendly_url.as_deref(),
            contact_email: non_blank(req.contact_email.as_deref()),
        };
        let trust = self.db.update_trust_settings(org_id, &update).await?;
        tracing::info!(org_id = %org_id, status = ?trust.status, "Trust portal settings updated");
        Ok(trust)
    }

    pub async fn frameworks(&self, org_id: Uuid) -> Result<Vec<TrustFrameworkSetting>, AppError> {
        self.db.list_trust_frameworks(org_id).await
    }

    pub async fn update_framework(
        &self,
        org_id: Uuid,
        framework: Framework,
        req: &UpdateFrameworkRequest,
    ) -> Result<TrustFrameworkSetting, AppError> {
        self.db
            .upsert_trust_framework(org_id, framework, req.enabled, req.status)
            .await
    }

    pub async fn update_overview(&self, org_id: Uuid, req: &UpdateOverviewRequest) -> Result<Trust, AppError> {
        self.db
            .update_trust_overview(
                org_id,
                non_blank(req.title.as_deref()),
                non_blank(req.content.as_deref()),
                req.show,
            )
            .await
    }

    // ==================== Links ====================

    pub async fn links(&self, org_id: Uuid) -> Result<Vec<TrustCustomLink>, AppError> {
        self.db.list_trust_links(org_id, false).await
    }

    pub async fn create_link(&self, org_id: Uuid, req: &CreateLinkRequest) -> Result<TrustCustomLink, AppError> {
        self.db
            .insert_trust_link(org_id, req.title.trim(), req.url.trim(), non_blank(req.description.as_deref()))
            .await
    }

    pub async fn update_link(
        &self,
        org_id: Uuid,
        link_id: Uuid,
        req: &UpdateLinkRequest,
    ) -> Result<TrustCustomLink, AppError> {
        self.db
            .update_trust_link(
                org_id,
                link_id,
                req.title.as_deref().map(str::trim),
                req.url.as_deref().map(str::trim),
                req.description.as_deref(),
                req.is_active,
            )
            .await
    }

    pub async fn delete_link(&self, org_id: Uuid, link_id: Uuid) -> Result<(), AppError> {
        self.db.delete_trust_link(org_id, link_id).await
    }

    pub async fn reorder_links(&self, org_id: Uuid, ids: &[Uuid]) -> Result<Vec<TrustCustomLink>, AppError> {
        self.db.reorder_trust_links(org_id, ids).await
    }

    // ==================== Domain ====================

    #[tracing::instrument(skip(self))]
    pub async fn set_domain(&self, org_id: Uuid, domain: &str) -> Result<(Trust, DomainStatus), AppError> {
        let domain = domain.trim().to_lowercase();
        validate_domain(&domain)?;

        let current = self.settings(org_id).await?;
        let status = self.domains.add_domain(&domain).await?;
        let trust = self.db.set_trust_domain(org_id, &domain).await?;

        if let Some(previous) = current.domain.filter(|d| *d != domain) {
            if let Err(e) = self.domains.remove_domain(&previous).await {
                tracing::warn!(domain = %previous, error = %e, "Failed to detach previous domain");
            }
        }
        tracing::info!(org_id = %org_id, domain = %domain, "Custom domain attached");
        Ok((trust, status))
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_domain(&self, org_id: Uuid) -> Result<Trust, AppError> {
        let current = self.settings(org_id).await?;
        if let Some(domain) = &current.domain {
            if let Err(e) = self.domains.remove_domain(domain).await {
                tracing::warn!(domain = %domain, error = %e, "Failed to detach domain from Vercel");
            }
        }
        self.db.clear_trust_domain(org_id).await
    }

    /// Vercel's view of the domain. Verification is persisted when the
    /// domain is the one configured for this portal.
    pub async fn domain_status(&self, org_id: Uuid, domain: &str) -> Result<DomainStatus, AppError> {
        let domain = domain.trim().to_lowercase();
        validate_domain(&domain)?;
        let status = self.domains.domain_status(&domain).await?;
        let verified = status.verified && !status.misconfigured;
        if self.db.set_trust_domain_verified(org_id, &domain, verified).await? {
            tracing::debug!(org_id = %org_id, domain = %domain, verified, "Domain verification stored");
        }
        Ok(status)
    }

    // ==================== Files ====================

    async fn signed_url(&self, key: &str) -> Result<SignedUrlResponse, AppError> {
        let ttl = std::time::Duration::from_secs(self.config.signed_url_ttl_secs);
        Ok(SignedUrlResponse {
            url: self.storage.signed_url(key, ttl).await?,
            expires_at: Utc::now() + Duration::seconds(self.config.signed_url_ttl_secs as i64),
        })
    }

    #[tracing::instrument(skip(self, req), fields(framework = %req.framework))]
    pub async fn upload_resource(&self, org_id: Uuid, req: &UploadResourceRequest) -> Result<TrustResource, AppError> {
        let bytes = decode_upload(&req.file_data, self.config.max_upload_bytes)?;
        ensure_pdf(&req.file_type, &bytes)?;

        let size = bytes.len() as i64;
        let key = resource_key(org_id, req.framework, Utc::now(), &req.file_name);
        self.storage.upload(&key, bytes, "application/pdf").await?;

        let (resource, previous_key) = match self
            .db
            .upsert_trust_resource(org_id, req.framework, req.file_name.trim(), size, &key)
            .await
        {
            Ok(saved) => saved,
            Err(e) => {
                delete_best_effort(self.storage.as_ref(), &key).await;
                return Err(e);
            }
        };
        if let Some(previous) = previous_key.filter(|k| *k != key) {
            delete_best_effort(self.storage.as_ref(), &previous).await;
        }
        tracing::info!(org_id = %org_id, resource_id = %resource.id, size, "Compliance resource stored");
        Ok(resource)
    }

    pub async fn resources(&self, org_id: Uuid) -> Result<Vec<TrustResource>, AppError> {
        self.db.list_trust_resources(org_id).await
    }

    pub async fn resource_url(&self, org_id: Uuid, framework: Framework) -> Result<SignedUrlResponse, AppError> {
        let resource = self
            .db
            .find_trust_resource(org_id, framework)
            .await?
            .ok_or_else(|| AppError::not_found("Compliance resource not found"))?;
        self.signed_url(&resource.s3_key).await
    }

    pub async fn delete_resource(&self, org_id: Uuid, framework: Framework) -> Result<(), AppError> {
        let removed = self.db.delete_trust_resource(org_id, framework).await?;
        delete_best_effort(self.storage.as_ref(), &removed.s3_key).await;
        Ok(())
    }

    #[tracing::instrument(skip(self, req), fields(name = %req.name))]
    pub async fn upload_document(&self, org_id: Uuid, req: &UploadDocumentRequest) -> Result<TrustDocument, AppError> {
        let bytes = decode_upload(&req.file_data, self.config.max_upload_bytes)?;
        let size = bytes.len() as i64;
        let id = Uuid::new_v4();
        let key = document_key(org_id, id, &req.file_name);
        self.storage.upload(&key, bytes, req.file_type.trim()).await?;

        match self
            .db
            .insert_trust_document(
                id,
                org_id,
                req.name.trim(),
                non_blank(req.description.as_deref()),
                req.file_name.trim(),
                size,
                &key,
            )
            .await
        {
            Ok(document) => Ok(document),
            Err(e) => {
                delete_best_effort(self.storage.as_ref(), &key).await;
                Err(e)
            }
        }
    }

    pub async fn documents(&self, org_id: Uuid) -> Result<Vec<TrustDocument>, AppError> {
        self.db.list_trust_documents(org_id).await
    }

    pub async fn document_url(&self, org_id: Uuid, document_id: Uuid) -> Result<SignedUrlResponse, AppError> {
        let document = self
            .db
            .find_trust_document(org_id, document_id)
            .await?
            .ok_or_else(|| AppError::not_found("Document not found"))?;
        self.signed_url(&document.s3_key).await
    }

    pub async fn delete_document(&self, org_id: Uuid, document_id: Uuid) -> Result<(), AppError> {
        let document = self.db.deactivate_trust_document(org_id, document_id).await?;
        delete_best_effort(self.storage.as_ref(), &document.s3_key).await;
        Ok(())
    }

    pub async fn vendors(&self, org_id: Uuid) -> Result<Vec<Vendor>, AppError> {
        self.db.list_public_vendors(org_id).await
    }

    // ==================== Public ====================

    pub async fn public_portal(&self, friendly_url: &str) -> Result<PublicTrustPortal, AppError> {
        let trust = self
            .db
            .find_trust_by_friendly_url(&friendly_url.to_lowercase())
            .await?
            .filter(Trust::is_published)
            .ok_or_else(|| AppError::not_found("Trust portal not found"))?;
        let org = self
            .db
            .find_organization(trust.org_id)
            .await?
            .ok_or_else(|| AppError::not_found("Trust portal not found"))?;

        let frameworks = self
            .db
            .list_trust_frameworks(org.id)
            .await?
            .into_iter()
            .filter(|f| f.enabled)
            .map(|f| PublicFramework {
                framework: f.framework,
                label: f.framework.label().to_string(),
                status: f.status,
            })
            .collect();
        let links = self
            .db
            .list_trust_links(org.id, true)
            .await?
            .into_iter()
            .map(|l| PublicLink {
                title: l.title,
                url: l.url,
                description: l.description,
            })
            .collect();
        let vendors = self
            .db
            .list_public_vendors(org.id)
            .await?
            .into_iter()
            .map(|v| PublicVendor {
                name: v.name,
                website: v.website,
                category: v.category,
            })
            .collect();
        let documents = self
            .db
            .list_trust_documents(org.id)
            .await?
            .into_iter()
            .map(|d| PublicDocument {
                id: d.id,
                name: d.name,
                description: d.description,
            })
            .collect();
        let resources = self
            .db
            .list_trust_resources(org.id)
            .await?
            .into_iter()
            .map(|r| PublicResource {
                framework: r.framework,
                file_name: r.file_name,
            })
            .collect();

        let overview = trust.show_overview.then(|| PublicOverview {
            title: trust.overview_title.clone(),
            content: trust.overview_content.clone(),
        });

        Ok(PublicTrustPortal {
            organization_name: org.name,
            friendly_url: trust.friendly_url,
            contact_email: trust.contact_email,
            overview,
            frameworks,
            links,
            vendors,
            documents,
            resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn decodes_plain_and_data_url_payloads() {
        let encoded = STANDARD.encode(b"%PDF-1.4 body");
        assert_eq!(decode_upload(&encoded, 1024).unwrap(), b"%PDF-1.4 body");

        let data_url = format!("data:application/pdf;base64,{}", encoded);
        assert_eq!(decode_upload(&data_url, 1024).unwrap(), b"%PDF-1.4 body");
    }

    #[test]
    fn rejects_bad_base64_and_empty_files() {
        assert_eq!(
            decode_upload("not base64!!", 1024).unwrap_err().status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(decode_upload("", 1024).unwrap_err().status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn enforces_size_limit() {
        let encoded = STANDARD.encode(vec![7u8; 2048]);
        assert_eq!(
            decode_upload(&encoded, 1024).unwrap_err().status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert!(decode_upload(&encoded, 2048).is_ok());
    }

    #[test]
    fn pdf_check_needs_type_and_magic() {
        assert!(ensure_pdf("application/pdf", b"%PDF-1.7").is_ok());
        assert!(ensure_pdf("APPLICATION/PDF", b"%PDF-1.7").is_ok());
        assert!(ensure_pdf("image/png", b"%PDF-1.7").is_err());
        assert!(ensure_pdf("application/pdf", b"\x89PNG").is_err());
    }
}
