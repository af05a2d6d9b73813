use compliance_service::config::ComplianceConfig;
use compliance_service::services::init_metrics;
use compliance_service::startup::Application;
use service_core::error::AppError;
use service_core::middleware::metrics::install_recorder;
use service_core::observability::{init_tracing, TracingOptions};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = ComplianceConfig::load()?;

    init_tracing(TracingOptions {
        service_name: &config.service_name,
        log_level: &config.log_level,
        otlp_endpoint: config.otlp_endpoint.as_deref(),
    });

    init_metrics();
    install_recorder();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.common.environment,
        storage = ?config.storage.backend,
        email = ?config.email.backend,
        "Starting compliance service"
    );

    let application = Application::build(config).await?;
    tracing::info!(port = application.port(), "Compliance service ready");

    application.run_until_stopped().await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}
