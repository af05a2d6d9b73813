use service_core::config::{self as core_config, get_env, get_env_opt, get_env_parsed};
use service_core::error::AppError;

#[derive(Debug, Clone)]
pub struct ComplianceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub auth: AuthConfig,
    pub vercel: VercelConfig,
    pub trust: TrustConfig,
    pub rate_limit: RateLimitConfig,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: String,
    /// Secret used to sign local download URLs.
    pub signing_secret: String,
    /// Externally reachable base URL of this service, used in local signed URLs.
    pub public_base_url: String,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailBackend {
    Smtp,
    Log,
}

impl std::str::FromStr for EmailBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "smtp" => Ok(EmailBackend::Smtp),
            "log" => Ok(EmailBackend::Log),
            _ => Err(format!("Invalid email backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub backend: EmailBackend,
    pub from_address: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 secret shared with the session issuer.
    pub session_secret: String,
}

#[derive(Debug, Clone)]
pub struct VercelConfig {
    pub api_base: String,
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub team_id: Option<String>,
}

impl VercelConfig {
    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.project_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Base URL of the public trust portal (NDA and access links point here).
    pub portal_base_url: String,
    /// Base URL of the admin app (review and invitation links point here).
    pub admin_base_url: String,
    pub nda_link_ttl_hours: i64,
    pub access_token_ttl_hours: i64,
    pub default_grant_days: i32,
    pub max_grant_days: i32,
    pub max_upload_bytes: usize,
    pub signed_url_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub public_requests: u32,
    pub public_window_seconds: u64,
}

impl ComplianceConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.environment.is_prod();

        let storage_backend: StorageBackend = get_env("STORAGE_BACKEND", Some("local"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let email_backend: EmailBackend = get_env("EMAIL_BACKEND", Some("log"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let config = ComplianceConfig {
            service_name: get_env("SERVICE_NAME", Some("compliance-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: get_env_opt("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: get_env_parsed("DATABASE_MAX_CONNECTIONS", 10, false)?,
                min_connections: get_env_parsed("DATABASE_MIN_CONNECTIONS", 1, false)?,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_path: get_env("STORAGE_LOCAL_PATH", Some("storage"), false)?,
                signing_secret: get_env(
                    "STORAGE_SIGNING_SECRET",
                    Some("dev-storage-signing-secret"),
                    is_prod && storage_backend == StorageBackend::Local,
                )?,
                public_base_url: get_env(
                    "PUBLIC_BASE_URL",
                    Some("http://localhost:8080"),
                    is_prod,
                )?,
                s3_bucket: get_env_opt("STORAGE_S3_BUCKET"),
                s3_region: get_env_opt("STORAGE_S3_REGION"),
                s3_endpoint: get_env_opt("STORAGE_S3_ENDPOINT"),
                s3_access_key: get_env_opt("STORAGE_S3_ACCESS_KEY"),
                s3_secret_key: get_env_opt("STORAGE_S3_SECRET_KEY"),
            },
            email: EmailConfig {
                backend: email_backend,
                from_address: get_env(
                    "EMAIL_FROM",
                    Some("Trust Portal <no-reply@localhost>"),
                    is_prod,
                )?,
                smtp_host: get_env_opt("SMTP_HOST"),
                smtp_port: get_env_parsed("SMTP_PORT", 587, false)?,
                smtp_user: get_env_opt("SMTP_USER"),
                smtp_password: get_env_opt("SMTP_PASSWORD"),
            },
            auth: AuthConfig {
                session_secret: get_env("SESSION_SECRET", Some("dev-session-secret"), is_prod)?,
            },
            vercel: VercelConfig {
                api_base: get_env("VERCEL_API_BASE", Some("https://api.vercel.com"), false)?,
                token: get_env_opt("VERCEL_TOKEN"),
                project_id: get_env_opt("VERCEL_PROJECT_ID"),
                team_id: get_env_opt("VERCEL_TEAM_ID"),
            },
            trust: TrustConfig {
                portal_base_url: get_env(
                    "TRUST_PORTAL_BASE_URL",
                    Some("http://localhost:3000/trust"),
                    is_prod,
                )?,
                admin_base_url: get_env("ADMIN_BASE_URL", Some("http://localhost:3000"), is_prod)?,
                nda_link_ttl_hours: get_env_parsed("TRUST_NDA_LINK_TTL_HOURS", 168, false)?,
                access_token_ttl_hours: get_env_parsed("TRUST_ACCESS_TOKEN_TTL_HOURS", 24, false)?,
                default_grant_days: get_env_parsed("TRUST_DEFAULT_GRANT_DAYS", 30, false)?,
                max_grant_days: get_env_parsed("TRUST_MAX_GRANT_DAYS", 365, false)?,
                max_upload_bytes: get_env_parsed("TRUST_MAX_UPLOAD_BYTES", 10 * 1024 * 1024, false)?,
                signed_url_ttl_secs: get_env_parsed("TRUST_SIGNED_URL_TTL_SECS", 900, false)?,
            },
            rate_limit: RateLimitConfig {
                public_requests: get_env_parsed("RATE_LIMIT_PUBLIC_REQUESTS", 20, false)?,
                public_window_seconds: get_env_parsed("RATE_LIMIT_PUBLIC_WINDOW_SECONDS", 60, false)?,
            },
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            common,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: &str| Err(AppError::ConfigError(anyhow::anyhow!(msg.to_string())));

        if self.trust.default_grant_days < 1 {
            return invalid("TRUST_DEFAULT_GRANT_DAYS must be at least 1");
        }
        if self.trust.max_grant_days < self.trust.default_grant_days {
            return invalid("TRUST_MAX_GRANT_DAYS must be >= TRUST_DEFAULT_GRANT_DAYS");
        }
        if self.trust.access_token_ttl_hours < 1 || self.trust.nda_link_ttl_hours < 1 {
            return invalid("Token lifetimes must be at least one hour");
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.s3_bucket.is_none() {
            return invalid("STORAGE_S3_BUCKET is required for the s3 storage backend");
        }
        if self.email.backend == EmailBackend::Smtp && self.email.smtp_host.is_none() {
            return invalid("SMTP_HOST is required for the smtp email backend");
        }
        if self.auth.session_secret.len() < 16 && self.common.environment.is_prod() {
            return invalid("SESSION_SECRET must be at least 16 characters");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn test_config() -> ComplianceConfig {
        ComplianceConfig {
            common: core_config::Config {
                port: 0,
                environment: core_config::Environment::Dev,
            },
            service_name: "compliance-service-test".to_string(),
            service_version: "test".to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: "postgres://localhost/compliance_test".to_string(),
                max_connections: 2,
                min_connections: 1,
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                local_path: "target/test-storage".to_string(),
                signing_secret: "test-signing-secret".to_string(),
                public_base_url: "http://localhost:8080".to_string(),
                s3_bucket: None,
                s3_region: None,
                s3_endpoint: None,
                s3_access_key: None,
                s3_secret_key: None,
            },
            email: EmailConfig {
                backend: EmailBackend::Log,
                from_address: "Trust Portal <no-reply@example.com>".to_string(),
                smtp_host: None,
                smtp_port: 587,
                smtp_user: None,
                smtp_password: None,
            },
            auth: AuthConfig {
                session_secret: "test-session-secret-0123456789".to_string(),
            },
            vercel: VercelConfig {
                api_base: "https://api.vercel.com".to_string(),
                token: None,
                project_id: None,
                team_id: None,
            },
            trust: TrustConfig {
                portal_base_url: "https://trust.example.com".to_string(),
                admin_base_url: "https://app.example.com".to_string(),
                nda_link_ttl_hours: 168,
                access_token_ttl_hours: 24,
                default_grant_days: 30,
                max_grant_days: 365,
                max_upload_bytes: 10 * 1024 * 1024,
                signed_url_ttl_secs: 900,
            },
            rate_limit: RateLimitConfig {
                public_requests: 20,
                public_window_seconds: 60,
            },
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }

    #[test]
    fn default_test_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn rejects_max_grant_below_default() {
        let mut config = test_config();
        config.trust.max_grant_days = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn s3_backend_requires_bucket() {
        let mut config = test_config();
        config.storage.backend = StorageBackend::S3;
        assert!(config.validate().is_err());
        config.storage.s3_bucket = Some("trust-files".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_backends() {
        assert_eq!("S3".parse::<StorageBackend>(), Ok(StorageBackend::S3));
        assert_eq!("log".parse::<EmailBackend>(), Ok(EmailBackend::Log));
        assert!("ftp".parse::<StorageBackend>().is_err());
    }
}
