use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{ApiKeyCreatedResponse, CreateApiKeyRequest, MessageResponse};
use crate::middleware::AuthContext;
use crate::services::tokens::generate_api_key;
use crate::startup::AppState;

fn require_privileged_member(auth: &AuthContext) -> Result<Uuid, AppError> {
    let member = auth.require_member()?;
    auth.require_privileged()?;
    Ok(member.id)
}

pub async fn create_api_key(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let member_id = require_privileged_member(&auth)?;
    req.validate()?;

    let issued = generate_api_key();
    let key = state
        .db
        .insert_api_key(auth.org_id, req.name.trim(), &issued.prefix, &issued.hash, Some(member_id))
        .await?;
    tracing::info!(org_id = %auth.org_id, key_id = %key.id, "API key created");

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyCreatedResponse {
            id: key.id,
            name: key.name,
            key: issued.plaintext,
            key_prefix: key.key_prefix,
            created_at: key.created_at,
        }),
    ))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    require_privileged_member(&auth)?;
    Ok(Json(state.db.list_api_keys(auth.org_id).await?))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(key_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_privileged_member(&auth)?;
    state.db.revoke_api_key(auth.org_id, key_id).await?;
    tracing::info!(org_id = %auth.org_id, key_id = %key_id, "API key revoked");
    Ok(Json(MessageResponse::new("API key revoked")))
}
