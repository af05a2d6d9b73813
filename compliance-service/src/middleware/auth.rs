//! Request authentication for the admin API.
//!
//! Sessions are issued elsewhere; this service only verifies the HS256 JWT
//! it receives, or an org-scoped API key sent as `X-API-Key`.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{Member, Role};
use crate::services::tokens::hash_token;
use crate::startup::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: Uuid,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Active organization.
    #[serde(default)]
    pub org: Option<Uuid>,
    pub exp: usize,
}

pub fn verify_session(token: &str, secret: &str) -> Result<SessionClaims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<SessionClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

/// Sign a session token. The service never issues sessions itself; this
/// exists for local tooling and tests.
pub fn sign_session(claims: &SessionClaims, secret: &str) -> Result<String, AppError> {
    let token = encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// A verified session, without any organization requirement.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub org_id: Option<Uuid>,
}

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::unauthorized("Missing or invalid Authorization header"))?;
        let claims = verify_session(token, &state.config.auth.session_secret)?;
        Ok(SessionUser {
            user_id: claims.sub,
            email: claims.email,
            name: claims.name,
            org_id: claims.org,
        })
    }
}

/// Who is acting on an organization's data.
#[derive(Debug, Clone)]
pub enum Principal {
    Member(Member),
    ApiKey { key_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub org_id: Uuid,
    pub principal: Principal,
}

impl AuthContext {
    pub fn member(&self) -> Option<&Member> {
        match &self.principal {
            Principal::Member(member) => Some(member),
            Principal::ApiKey { .. } => None,
        }
    }

    /// Member id recorded on audit entries. API keys act anonymously.
    pub fn actor(&self) -> Option<Uuid> {
        self.member().map(|m| m.id)
    }

    pub fn is_owner(&self) -> bool {
        match &self.principal {
            Principal::Member(member) => member.roles.contains(Role::Owner),
            Principal::ApiKey { .. } => true,
        }
    }

    /// Owners, admins and API keys.
    pub fn require_privileged(&self) -> Result<(), AppError> {
        let allowed = match &self.principal {
            Principal::Member(member) => member.roles.is_privileged(),
            Principal::ApiKey { .. } => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(AppError::forbidden("Owner or admin role required"))
        }
    }

    /// The signed-in member, for operations an API key cannot perform.
    pub fn require_member(&self) -> Result<&Member, AppError> {
        self.member()
            .ok_or_else(|| AppError::forbidden("This operation requires a signed-in member"))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(key) = parts.headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
            let api_key = state
                .db
                .find_active_api_key(&hash_token(key.trim()))
                .await?
                .ok_or_else(|| AppError::unauthorized("Invalid API key"))?;

            let db = state.db.clone();
            let key_id = api_key.id;
            tokio::spawn(async move {
                if let Err(e) = db.touch_api_key(key_id).await {
                    tracing::debug!(error = %e, key_id = %key_id, "Failed to record API key usage");
                }
            });

            tracing::Span::current().record("org_id", tracing::field::display(api_key.org_id));
            return Ok(AuthContext {
                org_id: api_key.org_id,
                principal: Principal::ApiKey { key_id },
            });
        }

        let session = SessionUser::from_request_parts(parts, state).await?;
        let org_id = session
            .org_id
            .ok_or_else(|| AppError::forbidden("Session has no active organization"))?;
        let member = state
            .db
            .find_active_member_by_user(org_id, session.user_id)
            .await?
            .ok_or_else(|| AppError::forbidden("Not a member of this organization"))?;

        tracing::Span::current().record("org_id", tracing::field::display(org_id));
        Ok(AuthContext {
            org_id,
            principal: Principal::Member(member),
        })
    }
}
