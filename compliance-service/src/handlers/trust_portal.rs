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
    CreateLinkRequest, DomainStatusParams, ReorderLinksRequest, SetDomainRequest,
    UpdateFrameworkRequest, UpdateLinkRequest, UpdateOverviewRequest, UpdateTrustSettingsRequest,
    UploadDocumentRequest, UploadResourceRequest,
};
use crate::middleware::AuthContext;
use crate::models::Framework;
use crate::startup::AppState;

// ==================== Settings ====================

pub async fn get_settings(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_portal.settings(auth.org_id).await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateTrustSettingsRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;
    Ok(Json(state.trust_portal.update_settings(auth.org_id, &req).await?))
}

pub async fn list_frameworks(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_portal.frameworks(auth.org_id).await?))
}

pub async fn update_framework(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(framework): Path<Framework>,
    Json(req): Json<UpdateFrameworkRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(
        state
            .trust_portal
            .update_framework(auth.org_id, framework, &req)
            .await?,
    ))
}

pub async fn update_overview(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateOverviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;
    Ok(Json(state.trust_portal.update_overview(auth.org_id, &req).await?))
}

// ==================== Links ====================

pub async fn list_links(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_portal.links(auth.org_id).await?))
}

pub async fn create_link(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateLinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;
    let link = state.trust_portal.create_link(auth.org_id, &req).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn update_link(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(link_id): Path<Uuid>,
    Json(req): Json<UpdateLinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;
    Ok(Json(
        state
            .trust_portal
            .update_link(auth.org_id, link_id, &req)
            .await?,
    ))
}

pub async fn delete_link(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(link_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    state.trust_portal.delete_link(auth.org_id, link_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_links(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ReorderLinksRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;
    Ok(Json(state.trust_portal.reorder_links(auth.org_id, &req.ids).await?))
}

// ==================== Domain ====================

pub async fn set_domain(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<SetDomainRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;
    let (trust, status) = state.trust_portal.set_domain(auth.org_id, &req.domain).await?;
    Ok(Json(json!({ "trust": trust, "domain_status": status })))
}

pub async fn remove_domain(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(state.trust_portal.remove_domain(auth.org_id).await?))
}

pub async fn domain_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<DomainStatusParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state
            .trust_portal
            .domain_status(auth.org_id, &params.domain)
            .await?,
    ))
}

// ==================== Compliance resources ====================

pub async fn upload_resource(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UploadResourceRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;
    let resource = state.trust_portal.upload_resource(auth.org_id, &req).await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

pub async fn list_resources(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_portal.resources(auth.org_id).await?))
}

pub async fn resource_url(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(framework): Path<Framework>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_portal.resource_url(auth.org_id, framework).await?))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(framework): Path<Framework>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    state.trust_portal.delete_resource(auth.org_id, framework).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Documents ====================

pub async fn upload_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    req.validate()?;
    let document = state.trust_portal.upload_document(auth.org_id, &req).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn list_documents(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_portal.documents(auth.org_id).await?))
}

pub async fn document_url(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state
            .trust_portal
            .document_url(auth.org_id, document_id)
            .await?,
    ))
}

pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    state
        .trust_portal
        .delete_document(auth.org_id, document_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_vendors(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_portal.vendors(auth.org_id).await?))
}

// ==================== Public ====================

pub async fn public_portal(
    State(state): State<AppState>,
    Path(friendly_url): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_portal.public_portal(&friendly_url).await?))
}
