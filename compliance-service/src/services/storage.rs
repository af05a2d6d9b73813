//! Object storage for NDA PDFs, compliance certificates and trust documents.
//!
//! Production uses S3 (or an S3-compatible store) with presigned GET URLs.
//! Development and tests use [`LocalStorage`], which signs its own download
//! URLs with HMAC-SHA256 and serves them from `GET /v1/files/*key`.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Builder as S3ConfigBuilder, Client as S3Client};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use service_core::error::AppError;
use sha2::Sha256;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::fs;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::models::Framework;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError>;
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
    /// Time-limited URL the browser can fetch the object from directly.
    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, AppError>;
}

/// Delete an object, logging instead of failing. For cleanup after the
/// primary operation has already succeeded or been rolled back.
pub async fn delete_best_effort(storage: &dyn Storage, key: &str) {
    if let Err(e) = storage.delete(key).await {
        tracing::warn!(key = %key, error = %e, "Best-effort object delete failed");
    }
}

// ==================== Keys ====================

/// Reduce a client-supplied file name to a safe single path segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches(|c| c == '.' || c == '_').to_string();
    let out: String = out.chars().take(120).collect();
    if out.is_empty() {
        "file".to_string()
    } else {
        out
    }
}

/// One object per signing attempt, so a losing concurrent attempt can clean
/// up after itself without touching the committed copy.
pub fn nda_key(org_id: Uuid, agreement_id: Uuid, attempt_id: Uuid) -> String {
    format!("{}/trust-nda/{}/{}.pdf", org_id, agreement_id, attempt_id)
}

pub fn resource_key(org_id: Uuid, framework: Framework, now: DateTime<Utc>, file_name: &str) -> String {
    format!(
        "{}/trust-resources/{}/{}-{}",
        org_id,
        framework,
        now.timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

pub fn document_key(org_id: Uuid, document_id: Uuid, file_name: &str) -> String {
    format!(
        "{}/trust-documents/{}/{}",
        org_id,
        document_id,
        sanitize_file_name(file_name)
    )
}

// ==================== Local ====================

type HmacSha256 = Hmac<Sha256>;

pub struct LocalStorage {
    base_path: PathBuf,
    signing_secret: Vec<u8>,
    public_base_url: String,
}

impl LocalStorage {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        signing_secret: &str,
        public_base_url: &str,
    ) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self {
            base_path,
            signing_secret: signing_secret.as_bytes().to_vec(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Map a key to a path under the base directory, rejecting traversal.
    fn path_for(&self, key: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AppError::bad_request("Invalid storage key"));
        }
        Ok(self.base_path.join(relative))
    }

    fn signature(&self, key: &str, expires: i64) -> Result<Vec<u8>, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_secret)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid signing key: {}", e)))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    pub fn sign(&self, key: &str, expires: i64) -> Result<String, AppError> {
        Ok(hex::encode(self.signature(key, expires)?))
    }

    /// Check a signed download link. Expired and forged links are both 403.
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        if now.timestamp() > expires {
            return Err(AppError::forbidden("Download link has expired"));
        }
        let provided = hex::decode(signature)
            .map_err(|_| AppError::forbidden("Invalid download signature"))?;
        let expected = self.signature(key, expires)?;
        if provided.len() != expected.len() || !bool::from(provided.ct_eq(&expected)) {
            return Err(AppError::forbidden("Invalid download signature"));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.path_for(key)?;
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found("File not found"))
            }
            Err(e) => Err(AppError::StorageError(anyhow::Error::new(e))),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, AppError> {
        self.path_for(key)?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!(
            "{}/v1/files/{}?expires={}&signature={}",
            self.public_base_url,
            key,
            expires,
            self.sign(key, expires)?
        ))
    }
}

// ==================== S3 ====================

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Build a client from config. A custom endpoint implies an
    /// S3-compatible store and switches to path-style addressing.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, AppError> {
        let bucket = config
            .s3_bucket
            .clone()
            .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("STORAGE_S3_BUCKET is not set")))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.s3_region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let (Some(access_key), Some(secret_key)) = (&config.s3_access_key, &config.s3_secret_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }
        let base_config = loader.load().await;

        let mut builder = S3ConfigBuilder::from(&base_config);
        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(bucket = %bucket, "S3 storage initialized");
        Ok(Self::new(S3Client::from_conf(builder.build()), bucket))
    }
}

fn s3_error(action: &str, err: impl std::fmt::Display) -> AppError {
    AppError::StorageError(anyhow::anyhow!("S3 {} failed: {}", action, err))
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| s3_error("upload", e))?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("download", e))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| s3_error("body collection", e))?
            .into_bytes()
            .to_vec();
        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("delete", e))?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, AppError> {
        let presigning = PresigningConfig::expires_in(ttl).map_err(|e| s3_error("presign", e))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| s3_error("presign", e))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    async fn local() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "secret", "http://localhost:8080/")
            .await
            .unwrap();
        (dir, storage)
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("SOC 2 Report (2024).pdf"), "SOC_2_Report_2024_.pdf");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\cert.pdf"), "cert.pdf");
        assert_eq!(sanitize_file_name("..."), "file");
    }

    #[test]
    fn keys_are_org_scoped() {
        let org = Uuid::new_v4();
        let now = Utc::now();
        let key = resource_key(org, Framework::Soc2Type2, now, "report.pdf");
        assert_eq!(
            key,
            format!("{}/trust-resources/soc2_type2/{}-report.pdf", org, now.timestamp_millis())
        );
        let agreement = Uuid::new_v4();
        let first = nda_key(org, agreement, Uuid::new_v4());
        let second = nda_key(org, agreement, Uuid::new_v4());
        assert!(first.starts_with(&format!("{}/trust-nda/{}/", org, agreement)));
        assert!(first.ends_with(".pdf"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn local_round_trip_and_traversal_guard() {
        let (_dir, storage) = local().await;
        storage
            .upload("org/trust-documents/a/file.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(
            storage.download("org/trust-documents/a/file.pdf").await.unwrap(),
            b"%PDF"
        );
        assert!(storage.upload("../escape", vec![1], "text/plain").await.is_err());
        storage.delete("org/trust-documents/a/file.pdf").await.unwrap();
        let missing = storage.download("org/trust-documents/a/file.pdf").await.unwrap_err();
        assert_eq!(missing.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signed_urls_verify_and_expire() {
        let (_dir, storage) = local().await;
        let url = storage
            .signed_url("org/x.pdf", Duration::from_secs(900))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:8080/v1/files/org/x.pdf?expires="));

        let now = Utc::now();
        let expires = now.timestamp() + 60;
        let signature = storage.sign("org/x.pdf", expires).unwrap();
        assert!(storage.verify("org/x.pdf", expires, &signature, now).is_ok());
        assert!(storage.verify("org/y.pdf", expires, &signature, now).is_err());
        assert!(storage.verify("org/x.pdf", expires, "zz", now).is_err());
        assert!(storage
            .verify("org/x.pdf", expires, &signature, now + ChronoDuration::seconds(120))
            .is_err());
    }
}
