use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{ComplianceConfig, StorageBackend};
use crate::handlers::{self, api_keys, files, invitations, organizations, registers};
use crate::middleware::auth::API_KEY_HEADER;
use crate::pdf::{NdaPdfService, PolicyPdfRenderer};
use crate::services::{
    build_domain_provider, build_provider, Database, DomainProvider, EmailProvider, LocalStorage,
    Mailer, S3Storage, Storage, TrustAccessService, TrustPortalService,
};

/// Headroom over the decoded upload limit for base64 and the JSON envelope.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: ComplianceConfig,
    pub db: Database,
    pub mailer: Mailer,
    pub storage: Arc<dyn Storage>,
    /// Set when objects live on disk and downloads go through `/v1/files`.
    pub local_storage: Option<Arc<LocalStorage>>,
    pub policy_pdf: PolicyPdfRenderer,
    pub trust_access: TrustAccessService,
    pub trust_portal: TrustPortalService,
    pub public_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire services over already-constructed backends.
    pub fn new(
        config: ComplianceConfig,
        db: Database,
        email: Arc<dyn EmailProvider>,
        storage: Arc<dyn Storage>,
        local_storage: Option<Arc<LocalStorage>>,
        domains: Arc<dyn DomainProvider>,
    ) -> Self {
        let mailer = Mailer::new(email);
        let policy_pdf = PolicyPdfRenderer::default();
        let trust_access = TrustAccessService::new(
            db.clone(),
            storage.clone(),
            mailer.clone(),
            NdaPdfService::default(),
            policy_pdf,
            config.trust.clone(),
        );
        let trust_portal =
            TrustPortalService::new(db.clone(), storage.clone(), domains, config.trust.clone());
        let public_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.public_requests,
            config.rate_limit.public_window_seconds,
        );

        Self {
            config,
            db,
            mailer,
            storage,
            local_storage,
            policy_pdf,
            trust_access,
            trust_portal,
            public_rate_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // People and access management
    let people_routes = Router::new()
        .route("/v1/organizations", post(organizations::create_organization))
        .route(
            "/v1/organizations/current",
            get(organizations::get_current_organization)
                .patch(organizations::update_current_organization),
        )
        .route("/v1/members", get(organizations::list_members))
        .route(
            "/v1/members/:id",
            get(organizations::get_member)
                .patch(organizations::update_member)
                .delete(organizations::remove_member),
        )
        .route(
            "/v1/invitations",
            get(invitations::list_invitations).post(invitations::create_invitation),
        )
        .route("/v1/invitations/accept", post(invitations::accept_invitation))
        .route(
            "/v1/invitations/:id",
            axum::routing::delete(invitations::revoke_invitation),
        )
        .route(
            "/v1/api-keys",
            get(api_keys::list_api_keys).post(api_keys::create_api_key),
        )
        .route(
            "/v1/api-keys/:id",
            axum::routing::delete(api_keys::revoke_api_key),
        )
        .route("/v1/audit-logs", get(organizations::list_audit_logs));

    let register_routes = Router::new()
        .route(
            "/v1/risks",
            get(registers::list_risks).post(registers::create_risk),
        )
        .route(
            "/v1/risks/:id",
            get(registers::get_risk)
                .patch(registers::update_risk)
                .delete(registers::delete_risk),
        )
        .route(
            "/v1/vendors",
            get(registers::list_vendors).post(registers::create_vendor),
        )
        .route(
            "/v1/vendors/:id",
            get(registers::get_vendor)
                .patch(registers::update_vendor)
                .delete(registers::delete_vendor),
        )
        .route(
            "/v1/tasks",
            get(registers::list_tasks).post(registers::create_task),
        )
        .route(
            "/v1/tasks/:id",
            get(registers::get_task)
                .patch(registers::update_task)
                .delete(registers::delete_task),
        )
        .route(
            "/v1/policies",
            get(registers::list_policies).post(registers::create_policy),
        )
        .route(
            "/v1/policies/:id",
            get(registers::get_policy)
                .patch(registers::update_policy)
                .delete(registers::delete_policy),
        )
        .route("/v1/policies/:id/publish", post(registers::publish_policy))
        .route("/v1/policies/:id/pdf", get(registers::policy_pdf));

    let portal_routes = {
        use handlers::trust_portal::*;
        Router::new()
            .route(
                "/v1/trust-portal/settings",
                get(get_settings).put(update_settings),
            )
            .route("/v1/trust-portal/frameworks", get(list_frameworks))
            .route(
                "/v1/trust-portal/frameworks/:framework",
                put(update_framework),
            )
            .route("/v1/trust-portal/overview", put(update_overview))
            .route(
                "/v1/trust-portal/links",
                get(list_links).post(create_link),
            )
            .route("/v1/trust-portal/links/reorder", post(reorder_links))
            .route(
                "/v1/trust-portal/links/:id",
                axum::routing::patch(update_link).delete(delete_link),
            )
            .route(
                "/v1/trust-portal/domain",
                put(set_domain).delete(remove_domain),
            )
            .route("/v1/trust-portal/domain/status", get(domain_status))
            .route(
                "/v1/trust-portal/compliance-resources",
                get(list_resources).post(upload_resource),
            )
            .route(
                "/v1/trust-portal/compliance-resources/:framework",
                axum::routing::delete(delete_resource),
            )
            .route(
                "/v1/trust-portal/compliance-resources/:framework/url",
                get(resource_url),
            )
            .route(
                "/v1/trust-portal/documents",
                get(list_documents).post(upload_document),
            )
            .route(
                "/v1/trust-portal/documents/:id",
                axum::routing::delete(delete_document),
            )
            .route("/v1/trust-portal/documents/:id/url", get(document_url))
            .route("/v1/trust-portal/vendors", get(list_vendors))
            .route("/v1/trust-portal/public/:friendly_url", get(public_portal))
    };

    // Anonymous submissions are rate limited per client IP
    let public_access_routes = {
        use handlers::trust_access::*;
        Router::new()
            .route(
                "/v1/trust-access/:friendly_url/requests",
                post(create_request),
            )
            .route("/v1/trust-access/:friendly_url/reclaim", post(reclaim))
            .route("/v1/trust-access/nda/:token/sign", post(sign_nda))
            .layer(from_fn_with_state(
                state.public_rate_limiter.clone(),
                ip_rate_limit_middleware,
            ))
    };

    let access_routes = {
        use handlers::trust_access::*;
        Router::new()
            .route("/v1/trust-access/nda/:token", get(nda_details))
            .route("/v1/trust-access/access/:token", get(grant_info))
            .route(
                "/v1/trust-access/access/:token/documents",
                get(grant_documents),
            )
            .route(
                "/v1/trust-access/access/:token/documents/:id/download",
                get(download_document),
            )
            .route(
                "/v1/trust-access/access/:token/resources/:framework/download",
                get(download_resource),
            )
            .route(
                "/v1/trust-access/access/:token/policies",
                get(grant_policies),
            )
            .route(
                "/v1/trust-access/access/:token/policies/:id/pdf",
                get(grant_policy_pdf),
            )
            .route("/v1/trust-access/admin/requests", get(list_requests))
            .route("/v1/trust-access/admin/requests/:id", get(get_request))
            .route(
                "/v1/trust-access/admin/requests/:id/approve",
                post(approve_request),
            )
            .route(
                "/v1/trust-access/admin/requests/:id/deny",
                post(deny_request),
            )
            .route(
                "/v1/trust-access/admin/requests/:id/cancel",
                post(cancel_request),
            )
            .route(
                "/v1/trust-access/admin/requests/:id/resend-nda",
                post(resend_nda),
            )
            .route(
                "/v1/trust-access/admin/requests/:id/nda-preview",
                get(nda_preview),
            )
            .route("/v1/trust-access/admin/grants", get(list_grants))
            .route(
                "/v1/trust-access/admin/grants/:id/revoke",
                post(revoke_grant),
            )
            .route(
                "/v1/trust-access/admin/grants/:id/resend-access",
                post(resend_access),
            )
    };

    let body_limit = state.config.trust.max_upload_bytes / 3 * 4 + BODY_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/v1/files/*key", get(files::download_file))
        .merge(people_routes)
        .merge(register_routes)
        .merge(portal_routes)
        .merge(public_access_routes)
        .merge(access_routes)
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    org_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: ComplianceConfig) -> Result<Self, AppError> {
        let db = Database::connect(&config.database).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to Postgres");
            e
        })?;
        db.run_migrations().await?;

        let (storage, local_storage) = build_storage(&config).await?;
        let email = build_provider(&config.email)?;
        let domains = build_domain_provider(&config.vercel)?;

        let state = AppState::new(config.clone(), db, email, storage, local_storage, domains);
        Self::serve(state).await
    }

    /// Bind and serve an already-wired state. Port 0 picks a free port.
    pub async fn serve(state: AppState) -> Result<Self, AppError> {
        let app = build_router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "Listening");

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn build_storage(
    config: &ComplianceConfig,
) -> Result<(Arc<dyn Storage>, Option<Arc<LocalStorage>>), AppError> {
    match config.storage.backend {
        StorageBackend::Local => {
            let local = Arc::new(
                LocalStorage::new(
                    &config.storage.local_path,
                    &config.storage.signing_secret,
                    &config.storage.public_base_url,
                )
                .await
                .map_err(|e| {
                    tracing::error!(
                        path = %config.storage.local_path,
                        error = %e,
                        "Failed to initialize local storage"
                    );
                    e
                })?,
            );
            tracing::info!(path = %config.storage.local_path, "Using local object storage");
            Ok((local.clone(), Some(local)))
        }
        StorageBackend::S3 => {
            let s3 = S3Storage::from_config(&config.storage).await?;
            tracing::info!("Using S3 object storage");
            Ok((Arc::new(s3), None))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
