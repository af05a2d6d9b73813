//! Org-scoped CRUD for risks, vendors, tasks and policies.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    CreatePolicyRequest, CreateRiskRequest, CreateTaskRequest, CreateVendorRequest, ListParams,
    RiskResponse, UpdatePolicyRequest, UpdateRiskRequest, UpdateTaskRequest,
    UpdateVendorRequest,
};
use crate::middleware::AuthContext;
use crate::models::{PolicyStatus, RiskStatus, TaskStatus, VendorStatus};
use crate::pdf::RichNode;
use crate::services::storage::sanitize_file_name;
use crate::startup::AppState;

// ==================== Risks ====================

pub async fn list_risks(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<ListParams<RiskStatus>>,
) -> Result<impl IntoResponse, AppError> {
    let risks = state
        .db
        .list_risks(auth.org_id, params.status, params.limit(), params.offset())
        .await?;
    Ok(Json(risks.into_iter().map(RiskResponse::from).collect::<Vec<_>>()))
}

pub async fn create_risk(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateRiskRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let risk = state.db.insert_risk(auth.org_id, &req).await?;
    Ok((StatusCode::CREATED, Json(RiskResponse::from(risk))))
}

pub async fn get_risk(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let risk = state
        .db
        .find_risk(auth.org_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Risk not found"))?;
    Ok(Json(RiskResponse::from(risk)))
}

pub async fn update_risk(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRiskRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let risk = state.db.update_risk(auth.org_id, id, &req).await?;
    Ok(Json(RiskResponse::from(risk)))
}

pub async fn delete_risk(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_risk(auth.org_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Vendors ====================

pub async fn list_vendors(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<ListParams<VendorStatus>>,
) -> Result<impl IntoResponse, AppError> {
    let vendors = state
        .db
        .list_vendors(auth.org_id, params.status, params.limit(), params.offset())
        .await?;
    Ok(Json(vendors))
}

pub async fn create_vendor(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateVendorRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let vendor = state.db.insert_vendor(auth.org_id, &req).await?;
    Ok((StatusCode::CREATED, Json(vendor)))
}

pub async fn get_vendor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let vendor = state
        .db
        .find_vendor(auth.org_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Vendor not found"))?;
    Ok(Json(vendor))
}

pub async fn update_vendor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateVendorRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    Ok(Json(state.db.update_vendor(auth.org_id, id, &req).await?))
}

pub async fn delete_vendor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_vendor(auth.org_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Tasks ====================

pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<ListParams<TaskStatus>>,
) -> Result<impl IntoResponse, AppError> {
    let tasks = state
        .db
        .list_tasks(auth.org_id, params.status, params.limit(), params.offset())
        .await?;
    Ok(Json(tasks))
}

pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let task = state.db.insert_task(auth.org_id, &req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let task = state
        .db
        .find_task(auth.org_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))?;
    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    Ok(Json(state.db.update_task(auth.org_id, id, &req).await?))
}

pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_task(auth.org_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Policies ====================

pub async fn list_policies(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<ListParams<PolicyStatus>>,
) -> Result<impl IntoResponse, AppError> {
    let policies = state
        .db
        .list_policies(auth.org_id, params.status, params.limit(), params.offset())
        .await?;
    Ok(Json(policies))
}

pub async fn create_policy(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreatePolicyRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    if let Some(content) = &req.content {
        RichNode::from_json(content)?;
    }
    let policy = state.db.insert_policy(auth.org_id, &req).await?;
    Ok((StatusCode::CREATED, Json(policy)))
}

pub async fn get_policy(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let policy = state
        .db
        .find_policy(auth.org_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Policy not found"))?;
    Ok(Json(policy))
}

pub async fn update_policy(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePolicyRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    if let Some(content) = &req.content {
        RichNode::from_json(content)?;
    }
    Ok(Json(state.db.update_policy(auth.org_id, id, &req).await?))
}

pub async fn publish_policy(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    let policy = state.db.publish_policy(auth.org_id, id).await?;
    tracing::info!(org_id = %auth.org_id, policy_id = %policy.id, "Policy published");
    Ok(Json(policy))
}

pub async fn delete_policy(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_policy(auth.org_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn policy_pdf(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let policy = state
        .db
        .find_policy(auth.org_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Policy not found"))?;
    let root = RichNode::from_json(&policy.content)?;
    let pdf = state.policy_pdf.render(&policy.name, &root)?;
    Ok(pdf_response(&policy.name, pdf))
}

/// Inline PDF with a sanitized download name.
pub(crate) fn pdf_response(name: &str, pdf: Vec<u8>) -> impl IntoResponse {
    let disposition = format!("inline; filename=\"{}.pdf\"", sanitize_file_name(name));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
}
