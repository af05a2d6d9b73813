//! Trust access workflow: request, review, NDA signature, grant, revocation.
//!
//! State changes commit in one database transaction each. Emails go out
//! afterwards and never undo a committed transition.

use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::TrustConfig;
use crate::dtos::{
    AccessRequestOutcome, AccessRequestResponse, CreateAccessRequest, GrantAccessResponse,
    GrantDocumentsResponse, MessageResponse, NdaDetailsResponse, RequestDetailResponse,
    SharedPolicy, SignNdaRequest, SignNdaResponse, SignedUrlResponse,
};
use crate::models::{
    access_token_expiry, AccessRequestStatus, Framework, GrantStatus, NdaLinkState, Organization,
    Trust, TrustAccessGrant, TrustAccessRequest, TrustNdaAgreement,
};
use crate::pdf::{
    template_text, watermark, NdaContext, NdaPdfService, NdaReference, PolicyPdfRenderer, RichNode,
    NDA_TEMPLATE_VERSION,
};
use crate::services::database::{
    Database, GrantIssue, NdaSignature, NewAccessRequest, ReviewDecision,
};
use crate::services::email::templates::{self, AccessRequestDetails};
use crate::services::email::Mailer;
use crate::services::metrics;
use crate::services::storage::{delete_best_effort, nda_key, Storage};
use crate::services::tokens::generate_token;

/// Reply to reclaim requests whether or not a grant exists.
pub const RECLAIM_MESSAGE: &str =
    "If this email has active access, a new access link is on its way.";

/// Where the request came from, recorded for audit.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct TrustAccessService {
    db: Database,
    storage: Arc<dyn Storage>,
    mailer: Mailer,
    nda: NdaPdfService,
    policy_pdf: PolicyPdfRenderer,
    config: TrustConfig,
}

impl TrustAccessService {
    pub fn new(
        db: Database,
        storage: Arc<dyn Storage>,
        mailer: Mailer,
        nda: NdaPdfService,
        policy_pdf: PolicyPdfRenderer,
        config: TrustConfig,
    ) -> Self {
        Self {
            db,
            storage,
            mailer,
            nda,
            policy_pdf,
            config,
        }
    }

    fn grant_issue(&self) -> GrantIssue {
        GrantIssue {
            default_days: self.config.default_grant_days,
            max_days: self.config.max_grant_days,
            access_token_ttl_hours: self.config.access_token_ttl_hours,
        }
    }

    fn grant_days(&self, request: &TrustAccessRequest) -> i32 {
        request.grant_duration_days(None, self.config.default_grant_days, self.config.max_grant_days)
    }

    fn access_url(&self, token: &str) -> String {
        format!("{}/access/{}", self.config.portal_base_url.trim_end_matches('/'), token)
    }

    fn sign_url(&self, token: &str) -> String {
        format!("{}/nda/{}", self.config.portal_base_url.trim_end_matches('/'), token)
    }

    fn review_url(&self, request_id: Uuid) -> String {
        format!(
            "{}/trust-access/requests/{}",
            self.config.admin_base_url.trim_end_matches('/'),
            request_id
        )
    }

    fn portal_url(&self, friendly_url: &str) -> String {
        format!("{}/{}", self.config.portal_base_url.trim_end_matches('/'), friendly_url)
    }

    async fn published_portal(&self, friendly_url: &str) -> Result<(Trust, Organization), AppError> {
        let trust = self
            .db
            .find_trust_by_friendly_url(friendly_url)
            .await?
            .filter(Trust::is_published)
            .ok_or_else(|| AppError::not_found("Trust portal not found"))?;
        let org = self.organization(trust.org_id).await?;
        Ok((trust, org))
    }

    async fn organization(&self, org_id: Uuid) -> Result<Organization, AppError> {
        self.db
            .find_organization(org_id)
            .await?
            .ok_or_else(|| AppError::not_found("Organization not found"))
    }

    /// Issue a fresh access token when the current one has lapsed but the grant is live.
    async fn refresh_access_token(
        &self,
        grant: TrustAccessGrant,
        now: DateTime<Utc>,
    ) -> Result<TrustAccessGrant, AppError> {
        if !grant.access_token_needs_rotation(now) {
            return Ok(grant);
        }
        let expires_at = access_token_expiry(now, self.config.access_token_ttl_hours, grant.expires_at);
        let rotated = self
            .db
            .rotate_access_token(grant.id, &generate_token(), expires_at)
            .await?;
        tracing::info!(grant_id = %rotated.id, "Rotated expired access token");
        Ok(rotated)
    }

    async fn send_access_link(&self, org: &Organization, grant: &TrustAccessGrant) {
        let content = templates::access_reclaim(
            &org.name,
            &self.access_url(&grant.access_token),
            grant.access_token_expires_at,
        );
        self.mailer.send_best_effort(&grant.subject_email, &content).await;
    }

    async fn send_nda_link(&self, org: &Organization, request: &TrustAccessRequest, agreement: &TrustNdaAgreement) {
        let content = templates::nda_signing(
            &org.name,
            &request.name,
            &self.sign_url(&agreement.sign_token),
            agreement.sign_token_expires_at,
        );
        self.mailer.send_best_effort(&request.email, &content).await;
    }

    // ==================== Public ====================

    #[tracing::instrument(skip(self, req, client), fields(email = %req.email))]
    pub async fn request_access(
        &self,
        friendly_url: &str,
        req: &CreateAccessRequest,
        client: &ClientInfo,
    ) -> Result<AccessRequestResponse, AppError> {
        let (_, org) = self.published_portal(friendly_url).await?;
        let email = req.email.trim();
        let now = Utc::now();

        if let Some(grant) = self.db.find_live_grant_by_email(org.id, email, now).await? {
            let grant = self.refresh_access_token(grant, now).await?;
            self.send_access_link(&org, &grant).await;
            metrics::record_access_request(AccessRequestOutcome::AlreadyApproved.as_str());
            return Ok(AccessRequestResponse {
                status: AccessRequestOutcome::AlreadyApproved,
                request_id: None,
                message: "You already have access. We have emailed you a link.".to_string(),
            });
        }

        if let Some(pending) = self.db.find_pending_request_by_email(org.id, email).await? {
            metrics::record_access_request(AccessRequestOutcome::AlreadyPending.as_str());
            return Ok(AccessRequestResponse {
                status: AccessRequestOutcome::AlreadyPending,
                request_id: Some(pending.id),
                message: "Your request is already being reviewed.".to_string(),
            });
        }

        let created = self
            .db
            .create_access_request(
                org.id,
                &NewAccessRequest {
                    name: req.name.trim(),
                    email,
                    company: req.company.as_deref(),
                    job_title: req.job_title.as_deref(),
                    purpose: req.purpose.as_deref(),
                    requested_duration_days: req.requested_duration_days,
                    requester_ip: client.ip.as_deref(),
                    requester_user_agent: client.user_agent.as_deref(),
                },
            )
            .await?;
        metrics::record_access_request(AccessRequestOutcome::UnderReview.as_str());
        tracing::info!(org_id = %org.id, request_id = %created.id, "Access request created");

        self.notify_reviewers(&org, &created).await;

        Ok(AccessRequestResponse {
            status: AccessRequestOutcome::UnderReview,
            request_id: Some(created.id),
            message: "Your request has been submitted for review.".to_string(),
        })
    }

    async fn notify_reviewers(&self, org: &Organization, request: &TrustAccessRequest) {
        let reviewers = match self.db.list_privileged_members(org.id).await {
            Ok(reviewers) => reviewers,
            Err(e) => {
                tracing::warn!(error = %e, org_id = %org.id, "Could not load reviewers to notify");
                return;
            }
        };
        let content = templates::access_request_notification(
            &org.name,
            &AccessRequestDetails {
                name: &request.name,
                email: &request.email,
                company: request.company.as_deref(),
                job_title: request.job_title.as_deref(),
                purpose: request.purpose.as_deref(),
                requested_duration_days: request.requested_duration_days,
            },
            &self.review_url(request.id),
        );
        for reviewer in reviewers {
            self.mailer.send_best_effort(&reviewer.email, &content).await;
        }
    }

    /// Re-send the access link for a live grant. The response never reveals
    /// whether one exists.
    #[tracing::instrument(skip(self, email))]
    pub async fn reclaim(&self, friendly_url: &str, email: &str) -> Result<MessageResponse, AppError> {
        let (_, org) = self.published_portal(friendly_url).await?;
        let now = Utc::now();

        match self.db.find_live_grant_by_email(org.id, email.trim(), now).await? {
            Some(grant) => {
                let grant = self.refresh_access_token(grant, now).await?;
                self.send_access_link(&org, &grant).await;
            }
            None => tracing::debug!(org_id = %org.id, "Reclaim for an email without a live grant"),
        }
        Ok(MessageResponse::new(RECLAIM_MESSAGE))
    }

    async fn agreement_by_token(&self, token: &str) -> Result<(TrustNdaAgreement, TrustAccessRequest), AppError> {
        let agreement = self
            .db
            .find_agreement_by_sign_token(token)
            .await?
            .ok_or_else(|| AppError::not_found("NDA not found"))?;
        let request = self
            .db
            .find_access_request(agreement.org_id, agreement.access_request_id)
            .await?
            .ok_or_else(|| AppError::not_found("Access request not found"))?;
        Ok((agreement, request))
    }

    pub async fn nda_details(&self, token: &str) -> Result<NdaDetailsResponse, AppError> {
        let (agreement, request) = self.agreement_by_token(token).await?;
        let state = agreement.link_state(Utc::now())?;
        let org = self.organization(agreement.org_id).await?;

        let portal_url = match state {
            NdaLinkState::AlreadySigned => self
                .db
                .find_trust(org.id)
                .await?
                .map(|trust| self.portal_url(&trust.friendly_url)),
            NdaLinkState::Signable => None,
        };
        let recipient = match &request.company {
            Some(company) if !company.trim().is_empty() => format!("{} of {}", request.name, company),
            _ => request.name.clone(),
        };

        Ok(NdaDetailsResponse {
            id: agreement.id,
            status: agreement.status,
            organization_name: org.name.clone(),
            requester_name: request.name.clone(),
            requester_email: request.email.clone(),
            requester_company: request.company.clone(),
            expires_at: agreement.sign_token_expires_at,
            grant_duration_days: self.grant_days(&request),
            template_version: NDA_TEMPLATE_VERSION.to_string(),
            content: template_text(&org.name, &recipient),
            portal_url,
        })
    }

    #[tracing::instrument(skip(self, token, req, client), fields(signer = %req.email))]
    pub async fn sign_nda(
        &self,
        token: &str,
        req: &SignNdaRequest,
        client: &ClientInfo,
    ) -> Result<SignNdaResponse, AppError> {
        if !req.accept {
            return Err(AppError::bad_request("The NDA must be accepted to continue"));
        }
        let (agreement, request) = self.agreement_by_token(token).await?;
        if !request.email.eq_ignore_ascii_case(req.email.trim()) {
            return Err(AppError::bad_request(
                "Email does not match the access request",
            ));
        }

        let now = Utc::now();
        if agreement.link_state(now)? == NdaLinkState::AlreadySigned {
            return self.existing_signature(&agreement, now).await;
        }

        let org = self.organization(agreement.org_id).await?;
        let days = self.grant_days(&request);
        let ctx = NdaContext {
            reference: NdaReference::Agreement(agreement.id.to_string()),
            org_name: org.name.clone(),
            signer_name: req.name.trim().to_string(),
            signer_email: request.email.clone(),
            signer_company: request.company.clone(),
            signed_at: Some(now),
            signer_ip: client.ip.clone(),
            grant_days: Some(days),
        };
        let pdf = self.nda.generate_signed(&ctx)?;
        let key = nda_key(org.id, agreement.id, Uuid::new_v4());
        self.storage.upload(&key, pdf, "application/pdf").await?;

        let signature = NdaSignature {
            name: req.name.trim(),
            email: &request.email,
            ip: client.ip.as_deref(),
            user_agent: client.user_agent.as_deref(),
            pdf_key: &key,
            template_version: NDA_TEMPLATE_VERSION,
        };
        let grant = match self
            .db
            .sign_agreement(agreement.id, &signature, self.grant_issue(), &generate_token(), now)
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                delete_best_effort(self.storage.as_ref(), &key).await;
                // A concurrent attempt on the same link may have won the row lock.
                if let Ok((current, _)) = self.agreement_by_token(token).await {
                    if matches!(current.link_state(now), Ok(NdaLinkState::AlreadySigned)) {
                        return self.existing_signature(&current, now).await;
                    }
                }
                metrics::record_nda_signature("failed");
                return Err(e);
            }
        };
        metrics::record_nda_signature("signed");
        tracing::info!(org_id = %org.id, grant_id = %grant.id, "NDA signed, access granted");

        let access_url = self.access_url(&grant.access_token);
        let content = templates::access_granted(&org.name, &request.name, &access_url, grant.expires_at);
        self.mailer.send_best_effort(&grant.subject_email, &content).await;

        Ok(SignNdaResponse {
            grant_id: grant.id,
            access_url,
            expires_at: grant.expires_at,
            already_signed: false,
        })
    }

    async fn existing_signature(
        &self,
        agreement: &TrustNdaAgreement,
        now: DateTime<Utc>,
    ) -> Result<SignNdaResponse, AppError> {
        let grant_id = agreement
            .grant_id
            .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Signed NDA {} has no grant", agreement.id)))?;
        let grant = self
            .db
            .find_grant(agreement.org_id, grant_id)
            .await?
            .ok_or_else(|| AppError::not_found("Grant not found"))?;
        if grant.status == GrantStatus::Revoked {
            return Err(AppError::forbidden("Access has been revoked"));
        }
        let grant = self.refresh_access_token(grant, now).await?;
        Ok(SignNdaResponse {
            grant_id: grant.id,
            access_url: self.access_url(&grant.access_token),
            expires_at: grant.expires_at,
            already_signed: true,
        })
    }

    // ==================== Token-gated reads ====================

    /// Resolve an access token to a grant that may be used right now.
    pub async fn authorize(&self, token: &str) -> Result<TrustAccessGrant, AppError> {
        let grant = self
            .db
            .find_grant_by_access_token(token)
            .await?
            .ok_or_else(|| AppError::not_found("Access link not found"))?;
        grant.ensure_token_usable(Utc::now())?;
        Ok(grant)
    }

    pub async fn grant_info(&self, token: &str) -> Result<GrantAccessResponse, AppError> {
        let grant = self.authorize(token).await?;
        let org = self.organization(grant.org_id).await?;
        let trust = self
            .db
            .find_trust(org.id)
            .await?
            .ok_or_else(|| AppError::not_found("Trust portal not found"))?;
        Ok(GrantAccessResponse {
            grant_id: grant.id,
            organization_name: org.name,
            friendly_url: trust.friendly_url,
            subject_email: grant.subject_email,
            status: grant.status,
            expires_at: grant.expires_at,
            access_token_expires_at: grant.access_token_expires_at,
        })
    }

    pub async fn grant_documents(&self, token: &str) -> Result<GrantDocumentsResponse, AppError> {
        let grant = self.authorize(token).await?;
        Ok(GrantDocumentsResponse {
            documents: self.db.list_trust_documents(grant.org_id).await?,
            resources: self.db.list_trust_resources(grant.org_id).await?,
        })
    }

    async fn signed_url(&self, key: &str) -> Result<SignedUrlResponse, AppError> {
        let ttl = std::time::Duration::from_secs(self.config.signed_url_ttl_secs);
        let url = self.storage.signed_url(key, ttl).await?;
        Ok(SignedUrlResponse {
            url,
            expires_at: Utc::now() + Duration::seconds(self.config.signed_url_ttl_secs as i64),
        })
    }

    pub async fn document_download(&self, token: &str, document_id: Uuid) -> Result<SignedUrlResponse, AppError> {
        let grant = self.authorize(token).await?;
        let document = self
            .db
            .find_trust_document(grant.org_id, document_id)
            .await?
            .ok_or_else(|| AppError::not_found("Document not found"))?;
        tracing::info!(grant_id = %grant.id, document_id = %document.id, "Grantee downloaded document");
        self.signed_url(&document.s3_key).await
    }

    pub async fn resource_download(&self, token: &str, framework: Framework) -> Result<SignedUrlResponse, AppError> {
        let grant = self.authorize(token).await?;
        let resource = self
            .db
            .find_trust_resource(grant.org_id, framework)
            .await?
            .ok_or_else(|| AppError::not_found("Compliance resource not found"))?;
        self.signed_url(&resource.s3_key).await
    }

    pub async fn grant_policies(&self, token: &str) -> Result<Vec<SharedPolicy>, AppError> {
        let grant = self.authorize(token).await?;
        let policies = self.db.list_shareable_policies(grant.org_id).await?;
        Ok(policies.into_iter().map(SharedPolicy::from).collect())
    }

    /// Rendered policy stamped with the grantee's email. Returns (name, pdf).
    pub async fn policy_pdf(&self, token: &str, policy_id: Uuid) -> Result<(String, Vec<u8>), AppError> {
        let grant = self.authorize(token).await?;
        let policy = self
            .db
            .find_policy(grant.org_id, policy_id)
            .await?
            .filter(|p| p.is_shareable())
            .ok_or_else(|| AppError::not_found("Policy not found"))?;
        let root = RichNode::from_json(&policy.content)?;
        let pdf = self.policy_pdf.render(&policy.name, &root)?;
        let stamped = watermark(&pdf, &grant.subject_email, &policy.id.to_string())?;
        Ok((policy.name, stamped))
    }

    // ==================== Admin ====================

    pub async fn list_requests(
        &self,
        org_id: Uuid,
        status: Option<AccessRequestStatus>,
    ) -> Result<Vec<TrustAccessRequest>, AppError> {
        self.db.list_access_requests(org_id, status).await
    }

    pub async fn request_detail(&self, org_id: Uuid, request_id: Uuid) -> Result<RequestDetailResponse, AppError> {
        let request = self
            .db
            .find_access_request(org_id, request_id)
            .await?
            .ok_or_else(|| AppError::not_found("Access request not found"))?;
        Ok(RequestDetailResponse {
            nda_agreements: self.db.list_agreements_for_request(org_id, request_id).await?,
            grant: self.db.find_grant_for_request(org_id, request_id).await?,
            request,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn approve(
        &self,
        org_id: Uuid,
        request_id: Uuid,
        reviewer: Option<Uuid>,
        duration_days: Option<i32>,
    ) -> Result<RequestDetailResponse, AppError> {
        let now = Utc::now();
        let sign_expires_at = now + Duration::hours(self.config.nda_link_ttl_hours);
        let (request, agreement) = self
            .db
            .approve_access_request(
                org_id,
                request_id,
                reviewer,
                duration_days,
                self.grant_issue(),
                &generate_token(),
                sign_expires_at,
                now,
            )
            .await?;
        metrics::record_decision("approved");
        tracing::info!(org_id = %org_id, request_id = %request_id, "Access request approved");

        let org = self.organization(org_id).await?;
        self.send_nda_link(&org, &request, &agreement).await;

        Ok(RequestDetailResponse {
            request,
            nda_agreements: vec![agreement],
            grant: None,
        })
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn deny(
        &self,
        org_id: Uuid,
        request_id: Uuid,
        reviewer: Option<Uuid>,
        reason: Option<&str>,
    ) -> Result<TrustAccessRequest, AppError> {
        let request = self
            .db
            .decide_access_request(org_id, request_id, reviewer, ReviewDecision::Deny, reason, Utc::now())
            .await?;
        metrics::record_decision("denied");
        Ok(request)
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        org_id: Uuid,
        request_id: Uuid,
        reviewer: Option<Uuid>,
    ) -> Result<TrustAccessRequest, AppError> {
        let request = self
            .db
            .decide_access_request(org_id, request_id, reviewer, ReviewDecision::Cancel, None, Utc::now())
            .await?;
        metrics::record_decision("canceled");
        Ok(request)
    }

    #[tracing::instrument(skip(self))]
    pub async fn resend_nda(
        &self,
        org_id: Uuid,
        request_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<TrustNdaAgreement, AppError> {
        let sign_expires_at = Utc::now() + Duration::hours(self.config.nda_link_ttl_hours);
        let (request, agreement) = self
            .db
            .reissue_nda(org_id, request_id, actor, &generate_token(), sign_expires_at)
            .await?;
        let org = self.organization(org_id).await?;
        self.send_nda_link(&org, &request, &agreement).await;
        Ok(agreement)
    }

    /// The NDA as the requester will see it, stamped "PREVIEW".
    pub async fn nda_preview(&self, org_id: Uuid, request_id: Uuid) -> Result<Vec<u8>, AppError> {
        let request = self
            .db
            .find_access_request(org_id, request_id)
            .await?
            .ok_or_else(|| AppError::not_found("Access request not found"))?;
        let org = self.organization(org_id).await?;
        let reference = self
            .db
            .list_agreements_for_request(org_id, request_id)
            .await?
            .first()
            .map(|a| NdaReference::Agreement(a.id.to_string()))
            .unwrap_or_else(|| NdaReference::Request(request.id.to_string()));

        let ctx = NdaContext {
            reference,
            org_name: org.name,
            signer_name: request.name.clone(),
            signer_email: request.email.clone(),
            signer_company: request.company.clone(),
            signed_at: None,
            signer_ip: None,
            grant_days: Some(self.grant_days(&request)),
        };
        self.nda.preview(&ctx)
    }

    pub async fn list_grants(
        &self,
        org_id: Uuid,
        status: Option<GrantStatus>,
    ) -> Result<Vec<TrustAccessGrant>, AppError> {
        self.db.list_grants(org_id, status).await
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn revoke_grant(
        &self,
        org_id: Uuid,
        grant_id: Uuid,
        actor: Option<Uuid>,
        reason: Option<&str>,
    ) -> Result<TrustAccessGrant, AppError> {
        let (grant, voided) = self
            .db
            .revoke_grant(org_id, grant_id, actor, reason, Utc::now())
            .await?;
        metrics::record_grant_revoked(reason.is_some());
        tracing::info!(
            org_id = %org_id,
            grant_id = %grant_id,
            voided_agreements = voided,
            "Grant revoked"
        );
        Ok(grant)
    }

    #[tracing::instrument(skip(self))]
    pub async fn resend_access(&self, org_id: Uuid, grant_id: Uuid) -> Result<TrustAccessGrant, AppError> {
        let now = Utc::now();
        let grant = self
            .db
            .find_grant(org_id, grant_id)
            .await?
            .ok_or_else(|| AppError::not_found("Grant not found"))?;
        grant.ensure_active()?;
        if !grant.is_unexpired_active(now) {
            return Err(AppError::bad_request("Grant has expired"));
        }
        let grant = self.refresh_access_token(grant, now).await?;
        let org = self.organization(org_id).await?;
        self.send_access_link(&org, &grant).await;
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaim_message_does_not_mention_outcome() {
        let lower = RECLAIM_MESSAGE.to_lowercase();
        assert!(!lower.contains("not found"));
        assert!(!lower.contains("no grant"));
    }
}
