//! Downloads for locally stored objects behind HMAC-signed links.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use service_core::error::AppError;

use crate::services::Storage;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedFileParams {
    pub expires: i64,
    pub signature: String,
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("txt") => "text/plain; charset=utf-8",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}

pub async fn download_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<SignedFileParams>,
) -> Result<impl IntoResponse, AppError> {
    let local = state
        .local_storage
        .as_ref()
        .ok_or_else(|| AppError::not_found("File downloads are served by object storage"))?;
    local.verify(&key, params.expires, &params.signature, Utc::now())?;

    let data = local.download(&key).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for(&key)),
            (header::CACHE_CONTROL, "private, no-store"),
        ],
        data,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("org/trust-nda/a.pdf"), "application/pdf");
        assert_eq!(content_type_for("org/x/LOGO.PNG"), "image/png");
        assert_eq!(content_type_for("org/x/blob"), "application/octet-stream");
    }
}
