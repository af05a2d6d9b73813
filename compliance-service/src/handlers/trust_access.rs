use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::client_ip;
use std::net::SocketAddr;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    ApproveRequest, CreateAccessRequest, DenyRequest, GrantListParams, ReclaimRequest,
    RequestListParams, RevokeGrantRequest, SignNdaRequest,
};
use crate::handlers::registers::pdf_response;
use crate::middleware::AuthContext;
use crate::models::Framework;
use crate::services::ClientInfo;
use crate::startup::AppState;

fn client_info(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> ClientInfo {
    ClientInfo {
        ip: client_ip(headers, peer.map(|ConnectInfo(addr)| addr)).map(|ip| ip.to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(512).collect()),
    }
}

// ==================== Public ====================

pub async fn create_request(
    State(state): State<AppState>,
    Path(friendly_url): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<CreateAccessRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let client = client_info(&headers, peer);
    let response = state
        .trust_access
        .request_access(&friendly_url, &req, &client)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn reclaim(
    State(state): State<AppState>,
    Path(friendly_url): Path<String>,
    Json(req): Json<ReclaimRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    Ok(Json(state.trust_access.reclaim(&friendly_url, &req.email).await?))
}

pub async fn nda_details(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_access.nda_details(&token).await?))
}

pub async fn sign_nda(
    State(state): State<AppState>,
    Path(token): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<SignNdaRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let client = client_info(&headers, peer);
    Ok(Json(state.trust_access.sign_nda(&token, &req, &client).await?))
}

// ==================== Access token ====================

pub async fn grant_info(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_access.grant_info(&token).await?))
}

pub async fn grant_documents(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_access.grant_documents(&token).await?))
}

pub async fn download_document(
    State(state): State<AppState>,
    Path((token, document_id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state
            .trust_access
            .document_download(&token, document_id)
            .await?,
    ))
}

pub async fn download_resource(
    State(state): State<AppState>,
    Path((token, framework)): Path<(String, Framework)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state
            .trust_access
            .resource_download(&token, framework)
            .await?,
    ))
}

pub async fn grant_policies(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.trust_access.grant_policies(&token).await?))
}

pub async fn grant_policy_pdf(
    State(state): State<AppState>,
    Path((token, policy_id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let (name, pdf) = state.trust_access.policy_pdf(&token, policy_id).await?;
    Ok(pdf_response(&name, pdf))
}

// ==================== Admin ====================

pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<RequestListParams>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(
        state
            .trust_access
            .list_requests(auth.org_id, params.status)
            .await?,
    ))
}

pub async fn get_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(
        state
            .trust_access
            .request_detail(auth.org_id, request_id)
            .await?,
    ))
}

pub async fn approve_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
    body: Option<Json<ApproveRequest>>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    req.validate()?;
    Ok(Json(
        state
            .trust_access
            .approve(auth.org_id, request_id, auth.actor(), req.duration_days)
            .await?,
    ))
}

pub async fn deny_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
    body: Option<Json<DenyRequest>>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    req.validate()?;
    Ok(Json(
        state
            .trust_access
            .deny(auth.org_id, request_id, auth.actor(), req.reason.as_deref())
            .await?,
    ))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(
        state
            .trust_access
            .cancel(auth.org_id, request_id, auth.actor())
            .await?,
    ))
}

pub async fn resend_nda(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(
        state
            .trust_access
            .resend_nda(auth.org_id, request_id, auth.actor())
            .await?,
    ))
}

pub async fn nda_preview(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    let pdf = state.trust_access.nda_preview(auth.org_id, request_id).await?;
    Ok(pdf_response("nda-preview", pdf))
}

pub async fn list_grants(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<GrantListParams>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(
        state
            .trust_access
            .list_grants(auth.org_id, params.status)
            .await?,
    ))
}

pub async fn revoke_grant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(grant_id): Path<Uuid>,
    body: Option<Json<RevokeGrantRequest>>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    req.validate()?;
    Ok(Json(
        state
            .trust_access
            .revoke_grant(auth.org_id, grant_id, auth.actor(), req.reason.as_deref())
            .await?,
    ))
}

pub async fn resend_access(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(grant_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_privileged()?;
    Ok(Json(
        state
            .trust_access
            .resend_access(auth.org_id, grant_id)
            .await?,
    ))
}
