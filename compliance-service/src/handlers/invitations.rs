use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{AcceptInvitationRequest, CreateInvitationRequest};
use crate::middleware::{AuthContext, SessionUser};
use crate::models::{Role, RoleSet};
use crate::services::email::templates;
use crate::services::tokens::{generate_token, hash_token};
use crate::startup::AppState;

const INVITATION_TTL_DAYS: i64 = 7;

pub async fn create_invitation(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;

    let roles = RoleSet::new(req.roles);
    if roles.contains(Role::Owner) && !auth.is_owner() {
        return Err(AppError::forbidden("Only owners can invite owners"));
    }
    let email = req.email.trim().to_lowercase();
    if state
        .db
        .find_active_member_by_email(auth.org_id, &email)
        .await?
        .is_some()
    {
        return Err(AppError::conflict("This person is already a member"));
    }

    let token = generate_token();
    let expires_at = Utc::now() + Duration::days(INVITATION_TTL_DAYS);
    let invitation = state
        .db
        .create_invitation(auth.org_id, &email, &roles, &hash_token(&token), expires_at, auth.actor())
        .await?;

    let organization = state
        .db
        .find_organization(auth.org_id)
        .await?
        .ok_or_else(|| AppError::not_found("Organization not found"))?;
    let accept_url = format!(
        "{}/invitations/accept?token={}",
        state.config.trust.admin_base_url.trim_end_matches('/'),
        token
    );
    let content = templates::invitation(
        &organization.name,
        auth.member().map(|m| m.display_name()),
        &roles.to_string(),
        &accept_url,
        expires_at,
    );
    state.mailer.send_best_effort(&email, &content).await;

    tracing::info!(org_id = %auth.org_id, invitation_id = %invitation.id, "Invitation created");
    Ok((StatusCode::CREATED, Json(invitation)))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(state.db.list_pending_invitations(auth.org_id).await?))
}

pub async fn revoke_invitation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invitation_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(state.db.revoke_invitation(auth.org_id, invitation_id).await?))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    session: SessionUser,
    Json(req): Json<AcceptInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let invitation = state
        .db
        .find_invitation_by_token_hash(&hash_token(req.token.trim()))
        .await?
        .ok_or_else(|| AppError::not_found("Invitation not found"))?;

    if !invitation.email.eq_ignore_ascii_case(&session.email) {
        return Err(AppError::forbidden("This invitation was sent to a different email"));
    }
    if !invitation.is_acceptable(Utc::now()) {
        return Err(AppError::bad_request("Invitation has expired or is no longer valid"));
    }

    let member = state
        .db
        .accept_invitation(
            invitation.id,
            session.user_id,
            &session.email,
            session.name.as_deref(),
            Utc::now(),
        )
        .await?;
    tracing::info!(org_id = %member.org_id, member_id = %member.id, "Invitation accepted");
    Ok(Json(member))
}
