use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    AuditLogParams, CreateOrganizationRequest, UpdateMemberRequest, UpdateOrganizationRequest,
};
use crate::middleware::{AuthContext, SessionUser};
use crate::models::{Role, RoleSet};
use crate::startup::AppState;

// ==================== Organizations ====================

pub async fn create_organization(
    State(state): State<AppState>,
    session: SessionUser,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let (organization, member) = state
        .db
        .create_organization(
            session.user_id,
            &session.email,
            session.name.as_deref(),
            req.name.trim(),
            req.website.as_deref(),
        )
        .await?;

    tracing::info!(org_id = %organization.id, slug = %organization.slug, "Organization created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "organization": organization, "member": member })),
    ))
}

pub async fn get_current_organization(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let organization = state
        .db
        .find_organization(auth.org_id)
        .await?
        .ok_or_else(|| AppError::not_found("Organization not found"))?;
    Ok(Json(organization))
}

pub async fn update_current_organization(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;

    let organization = state
        .db
        .update_organization(auth.org_id, req.name.as_deref().map(str::trim), req.website.as_deref())
        .await?;
    Ok(Json(organization))
}

// ==================== Members ====================

pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.db.list_members(auth.org_id).await?))
}

pub async fn get_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(member_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let member = state
        .db
        .find_member(auth.org_id, member_id)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;
    Ok(Json(member))
}

pub async fn update_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(member_id): Path<Uuid>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;

    let roles = req.roles.map(RoleSet::new);
    if let Some(roles) = &roles {
        if roles.contains(Role::Owner) && !auth.is_owner() {
            return Err(AppError::forbidden("Only owners can grant the owner role"));
        }
    }

    let member = state
        .db
        .update_member(
            auth.org_id,
            member_id,
            roles.as_ref(),
            req.department.as_deref(),
            auth.actor(),
        )
        .await?;
    Ok(Json(member))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(member_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    let member = state
        .db
        .deactivate_member(auth.org_id, member_id, auth.actor())
        .await?;
    tracing::info!(org_id = %auth.org_id, member_id = %member.id, "Member deactivated");
    Ok(Json(member))
}

// ==================== Audit ====================

pub async fn list_audit_logs(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<AuditLogParams>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    let logs = state
        .db
        .list_audit_logs(auth.org_id, &params.entity_type, params.entity_id)
        .await?;
    Ok(Json(logs))
}
