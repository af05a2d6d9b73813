//! Access requests, NDA agreements and grants.
//!
//! Every state transition locks the row it guards (`FOR UPDATE`) and re-checks
//! the status inside the transaction, so concurrent reviewers cannot both win.

use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use sqlx::postgres::PgConnection;
use uuid::Uuid;

use super::{insert_audit_log, Database};
use crate::models::{
    access_token_expiry, AccessRequestStatus, AuditAction, GrantStatus, NewAuditLog,
    TrustAccessGrant, TrustAccessRequest, TrustNdaAgreement,
};
use crate::services::metrics;

#[derive(Debug)]
pub struct NewAccessRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub company: Option<&'a str>,
    pub job_title: Option<&'a str>,
    pub purpose: Option<&'a str>,
    pub requested_duration_days: Option<i32>,
    pub requester_ip: Option<&'a str>,
    pub requester_user_agent: Option<&'a str>,
}

/// Terminal review outcomes other than approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Deny,
    Cancel,
}

impl ReviewDecision {
    fn status(self) -> AccessRequestStatus {
        match self {
            ReviewDecision::Deny => AccessRequestStatus::Denied,
            ReviewDecision::Cancel => AccessRequestStatus::Canceled,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            ReviewDecision::Deny => "deny",
            ReviewDecision::Cancel => "cancel",
        }
    }

    fn audit_action(self) -> AuditAction {
        match self {
            ReviewDecision::Deny => AuditAction::Denied,
            ReviewDecision::Cancel => AuditAction::Canceled,
        }
    }
}

/// Lifetime settings applied when a signature turns into a grant.
#[derive(Debug, Clone, Copy)]
pub struct GrantIssue {
    pub default_days: i32,
    pub max_days: i32,
    pub access_token_ttl_hours: i64,
}

#[derive(Debug)]
pub struct NdaSignature<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub pdf_key: &'a str,
    pub template_version: &'a str,
}

impl Database {
    // ==================== Requests ====================

    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create_access_request(
        &self,
        org_id: Uuid,
        request: &NewAccessRequest<'_>,
    ) -> Result<TrustAccessRequest, AppError> {
        let mut tx = self.begin().await?;

        let created = sqlx::query_as::<_, TrustAccessRequest>(
            r#"
            INSERT INTO trust_access_requests (
                id, org_id, name, email, company, job_title, purpose,
                requested_duration_days, requester_ip, requester_user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(request.name)
        .bind(request.email)
        .bind(request.company)
        .bind(request.job_title)
        .bind(request.purpose)
        .bind(request.requested_duration_days)
        .bind(request.requester_ip)
        .bind(request.requester_user_agent)
        .fetch_one(&mut *tx)
        .await?;

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                org_id,
                "trust_access_request",
                created.id,
                AuditAction::Created,
                format!("Access requested by {}", created.email),
            )
            .with_data(serde_json::json!({
                "company": created.company,
                "requested_duration_days": created.requested_duration_days,
            })),
        )
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    pub async fn find_access_request(
        &self,
        org_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<TrustAccessRequest>, AppError> {
        let request = sqlx::query_as::<_, TrustAccessRequest>(
            "SELECT * FROM trust_access_requests WHERE org_id = $1 AND id = $2",
        )
        .bind(org_id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    pub async fn find_pending_request_by_email(
        &self,
        org_id: Uuid,
        email: &str,
    ) -> Result<Option<TrustAccessRequest>, AppError> {
        let request = sqlx::query_as::<_, TrustAccessRequest>(
            r#"
            SELECT * FROM trust_access_requests
            WHERE org_id = $1 AND lower(email) = lower($2) AND status = 'under_review'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    pub async fn list_access_requests(
        &self,
        org_id: Uuid,
        status: Option<AccessRequestStatus>,
    ) -> Result<Vec<TrustAccessRequest>, AppError> {
        let requests = sqlx::query_as::<_, TrustAccessRequest>(
            r#"
            SELECT * FROM trust_access_requests
            WHERE org_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(org_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    /// Approve a request under review and open a pending NDA for it.
    #[tracing::instrument(skip(self, sign_token))]
    #[allow(clippy::too_many_arguments)]
    pub async fn approve_access_request(
        &self,
        org_id: Uuid,
        request_id: Uuid,
        reviewer: Option<Uuid>,
        duration_override: Option<i32>,
        issue: GrantIssue,
        sign_token: &str,
        sign_token_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(TrustAccessRequest, TrustNdaAgreement), AppError> {
        let mut tx = self.begin().await?;

        let request = lock_request(&mut tx, org_id, request_id).await?;
        request.status.ensure_under_review("approve")?;
        let duration = request.grant_duration_days(duration_override, issue.default_days, issue.max_days);

        let request = sqlx::query_as::<_, TrustAccessRequest>(
            r#"
            UPDATE trust_access_requests SET
                status = 'approved',
                reviewer_member_id = $2,
                reviewed_at = $3,
                requested_duration_days = $4,
                updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(reviewer)
        .bind(now)
        .bind(duration)
        .fetch_one(&mut *tx)
        .await?;

        let agreement = insert_agreement(&mut tx, &request, sign_token, sign_token_expires_at).await?;

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                org_id,
                "trust_access_request",
                request_id,
                AuditAction::Approved,
                format!("Access approved for {} ({} days)", request.email, duration),
            )
            .by(reviewer)
            .with_data(serde_json::json!({ "duration_days": duration, "nda_agreement_id": agreement.id })),
        )
        .await?;

        tx.commit().await?;
        Ok((request, agreement))
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn decide_access_request(
        &self,
        org_id: Uuid,
        request_id: Uuid,
        reviewer: Option<Uuid>,
        decision: ReviewDecision,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TrustAccessRequest, AppError> {
        let mut tx = self.begin().await?;

        let request = lock_request(&mut tx, org_id, request_id).await?;
        request.status.ensure_under_review(decision.verb())?;

        let request = sqlx::query_as::<_, TrustAccessRequest>(
            r#"
            UPDATE trust_access_requests SET
                status = $2,
                reviewer_member_id = $3,
                reviewed_at = $4,
                decision_reason = $5,
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(decision.status())
        .bind(reviewer)
        .bind(now)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                org_id,
                "trust_access_request",
                request_id,
                decision.audit_action(),
                format!("Access request from {} {}", request.email, request.status.as_str()),
            )
            .by(reviewer)
            .with_data(serde_json::json!({ "reason": reason })),
        )
        .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// Void outstanding NDA links for an approved request and issue a new one.
    #[tracing::instrument(skip(self, sign_token))]
    pub async fn reissue_nda(
        &self,
        org_id: Uuid,
        request_id: Uuid,
        actor: Option<Uuid>,
        sign_token: &str,
        sign_token_expires_at: DateTime<Utc>,
    ) -> Result<(TrustAccessRequest, TrustNdaAgreement), AppError> {
        let mut tx = self.begin().await?;

        let request = lock_request(&mut tx, org_id, request_id).await?;
        if request.status != AccessRequestStatus::Approved {
            return Err(AppError::bad_request(format!(
                "Cannot resend the NDA for a request that is {}",
                request.status.as_str()
            )));
        }

        let already_signed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM trust_nda_agreements
                WHERE access_request_id = $1 AND status = 'signed'
            )
            "#,
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_signed {
            return Err(AppError::bad_request("NDA has already been signed"));
        }

        sqlx::query(
            r#"
            UPDATE trust_nda_agreements SET status = 'void', updated_at = NOW()
            WHERE access_request_id = $1 AND status = 'pending'
            "#,
        )
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        let agreement = insert_agreement(&mut tx, &request, sign_token, sign_token_expires_at).await?;

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                org_id,
                "trust_access_request",
                request_id,
                AuditAction::Resent,
                format!("NDA link re-sent to {}", request.email),
            )
            .by(actor)
            .with_data(serde_json::json!({ "nda_agreement_id": agreement.id })),
        )
        .await?;

        tx.commit().await?;
        Ok((request, agreement))
    }

    // ==================== NDA agreements ====================

    pub async fn find_agreement_by_sign_token(&self, token: &str) -> Result<Option<TrustNdaAgreement>, AppError> {
        let _timer = metrics::time_query("find_agreement_by_sign_token");
        let agreement = sqlx::query_as::<_, TrustNdaAgreement>(
            "SELECT * FROM trust_nda_agreements WHERE sign_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(agreement)
    }

    pub async fn list_agreements_for_request(
        &self,
        org_id: Uuid,
        request_id: Uuid,
    ) -> Result<Vec<TrustNdaAgreement>, AppError> {
        let agreements = sqlx::query_as::<_, TrustNdaAgreement>(
            r#"
            SELECT * FROM trust_nda_agreements
            WHERE org_id = $1 AND access_request_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(org_id)
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(agreements)
    }

    /// Record the signature and issue the grant in one transaction.
    #[tracing::instrument(skip(self, signature, access_token), fields(signer = %signature.email))]
    pub async fn sign_agreement(
        &self,
        agreement_id: Uuid,
        signature: &NdaSignature<'_>,
        issue: GrantIssue,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<TrustAccessGrant, AppError> {
        let mut tx = self.begin().await?;

        let agreement = sqlx::query_as::<_, TrustNdaAgreement>(
            "SELECT * FROM trust_nda_agreements WHERE id = $1 FOR UPDATE",
        )
        .bind(agreement_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("NDA not found"))?;
        agreement.ensure_signable(now)?;

        let request = lock_request(&mut tx, agreement.org_id, agreement.access_request_id).await?;
        if request.status != AccessRequestStatus::Approved {
            return Err(AppError::bad_request("Access request is no longer approved"));
        }

        let days = request
            .requested_duration_days
            .unwrap_or(issue.default_days)
            .clamp(1, issue.max_days.max(1));
        let expires_at = now + Duration::days(i64::from(days));
        let token_expires_at = access_token_expiry(now, issue.access_token_ttl_hours, expires_at);

        let grant = sqlx::query_as::<_, TrustAccessGrant>(
            r#"
            INSERT INTO trust_access_grants (
                id, org_id, access_request_id, subject_email, status, expires_at,
                access_token, access_token_expires_at, issued_by_member_id
            )
            VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(agreement.org_id)
        .bind(request.id)
        .bind(&request.email)
        .bind(expires_at)
        .bind(access_token)
        .bind(token_expires_at)
        .bind(request.reviewer_member_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::conflict("An active grant already exists for this request")
            }
            _ => AppError::from(e),
        })?;

        sqlx::query(
            r#"
            UPDATE trust_nda_agreements SET
                status = 'signed',
                grant_id = $2,
                signer_name = $3,
                signer_email = $4,
                signed_at = $5,
                signer_ip = $6,
                signer_user_agent = $7,
                pdf_signed_key = $8,
                pdf_template_version = $9,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(agreement.id)
        .bind(grant.id)
        .bind(signature.name)
        .bind(signature.email)
        .bind(now)
        .bind(signature.ip)
        .bind(signature.user_agent)
        .bind(signature.pdf_key)
        .bind(signature.template_version)
        .execute(&mut *tx)
        .await?;

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                agreement.org_id,
                "trust_nda_agreement",
                agreement.id,
                AuditAction::Signed,
                format!("NDA signed by {}", signature.email),
            )
            .with_data(serde_json::json!({
                "grant_id": grant.id,
                "signer_ip": signature.ip,
                "expires_at": grant.expires_at,
            })),
        )
        .await?;

        tx.commit().await?;
        Ok(grant)
    }

    // ==================== Grants ====================

    pub async fn find_grant(&self, org_id: Uuid, grant_id: Uuid) -> Result<Option<TrustAccessGrant>, AppError> {
        let grant = sqlx::query_as::<_, TrustAccessGrant>(
            "SELECT * FROM trust_access_grants WHERE org_id = $1 AND id = $2",
        )
        .bind(org_id)
        .bind(grant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grant)
    }

    pub async fn find_grant_by_access_token(&self, token: &str) -> Result<Option<TrustAccessGrant>, AppError> {
        let _timer = metrics::time_query("find_grant_by_access_token");
        let grant = sqlx::query_as::<_, TrustAccessGrant>(
            "SELECT * FROM trust_access_grants WHERE access_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grant)
    }

    /// Latest grant issued for a request.
    pub async fn find_grant_for_request(
        &self,
        org_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<TrustAccessGrant>, AppError> {
        let grant = sqlx::query_as::<_, TrustAccessGrant>(
            r#"
            SELECT * FROM trust_access_grants
            WHERE org_id = $1 AND access_request_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grant)
    }

    /// The unexpired active grant for an email, if any.
    pub async fn find_live_grant_by_email(
        &self,
        org_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TrustAccessGrant>, AppError> {
        let grant = sqlx::query_as::<_, TrustAccessGrant>(
            r#"
            SELECT * FROM trust_access_grants
            WHERE org_id = $1 AND lower(subject_email) = lower($2)
              AND status = 'active' AND expires_at > $3
            ORDER BY expires_at DESC
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .bind(email)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(grant)
    }

    pub async fn list_grants(
        &self,
        org_id: Uuid,
        status: Option<GrantStatus>,
    ) -> Result<Vec<TrustAccessGrant>, AppError> {
        let grants = sqlx::query_as::<_, TrustAccessGrant>(
            r#"
            SELECT * FROM trust_access_grants
            WHERE org_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(org_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    /// Replace the access token of a live grant.
    pub async fn rotate_access_token(
        &self,
        grant_id: Uuid,
        token: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<TrustAccessGrant, AppError> {
        sqlx::query_as::<_, TrustAccessGrant>(
            r#"
            UPDATE trust_access_grants SET
                access_token = $2, access_token_expires_at = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(grant_id)
        .bind(token)
        .bind(token_expires_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::bad_request("Grant is not active"))
    }

    /// Revoke an active grant and void every NDA agreement tied to it.
    #[tracing::instrument(skip(self, reason))]
    pub async fn revoke_grant(
        &self,
        org_id: Uuid,
        grant_id: Uuid,
        actor: Option<Uuid>,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(TrustAccessGrant, u64), AppError> {
        let mut tx = self.begin().await?;

        let grant = sqlx::query_as::<_, TrustAccessGrant>(
            "SELECT * FROM trust_access_grants WHERE org_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(org_id)
        .bind(grant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Grant not found"))?;
        grant.ensure_active()?;

        let grant = sqlx::query_as::<_, TrustAccessGrant>(
            r#"
            UPDATE trust_access_grants SET
                status = 'revoked',
                revoked_at = $2,
                revoked_by_member_id = $3,
                revoke_reason = $4,
                updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(grant_id)
        .bind(now)
        .bind(actor)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        let voided = sqlx::query(
            r#"
            UPDATE trust_nda_agreements SET status = 'void', updated_at = $3
            WHERE grant_id = $1
               OR (access_request_id = $2 AND status = 'pending')
            "#,
        )
        .bind(grant_id)
        .bind(grant.access_request_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        insert_audit_log(
            &mut tx,
            &NewAuditLog::new(
                org_id,
                "trust_access_grant",
                grant_id,
                AuditAction::Revoked,
                format!("Access revoked for {}", grant.subject_email),
            )
            .by(actor)
            .with_data(serde_json::json!({ "reason": reason, "voided_agreements": voided })),
        )
        .await?;

        tx.commit().await?;
        Ok((grant, voided))
    }
}

async fn lock_request(
    conn: &mut PgConnection,
    org_id: Uuid,
    request_id: Uuid,
) -> Result<TrustAccessRequest, AppError> {
    sqlx::query_as::<_, TrustAccessRequest>(
        "SELECT * FROM trust_access_requests WHERE org_id = $1 AND id = $2 FOR UPDATE",
    )
    .bind(org_id)
    .bind(request_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::not_found("Access request not found"))
}

async fn insert_agreement(
    conn: &mut PgConnection,
    request: &TrustAccessRequest,
    sign_token: &str,
    sign_token_expires_at: DateTime<Utc>,
) -> Result<TrustNdaAgreement, AppError> {
    let agreement = sqlx::query_as::<_, TrustNdaAgreement>(
        r#"
        INSERT INTO trust_nda_agreements (id, org_id, access_request_id, sign_token, sign_token_expires_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request.org_id)
    .bind(request.id)
    .bind(sign_token)
    .bind(sign_token_expires_at)
    .fetch_one(conn)
    .await?;
    Ok(agreement)
}
