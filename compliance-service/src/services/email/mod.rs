//! Outbound email.
//!
//! [`SmtpEmailProvider`] delivers through lettre, retrying transient SMTP
//! failures with exponential backoff. [`LogEmailProvider`] only logs and keeps
//! an in-memory outbox (development and tests). [`Mailer`] is what services
//! use: every workflow email is best-effort and never fails the operation
//! that triggered it.

pub mod templates;

pub use templates::EmailContent;

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{EmailBackend, EmailConfig};
use crate::services::metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, content: &EmailContent) -> Self {
        Self {
            to: to.into(),
            subject: content.subject.clone(),
            text: content.text.clone(),
            html: content.html.clone(),
        }
    }
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError>;
}

// ==================== SMTP ====================

#[derive(Clone)]
pub struct SmtpEmailProvider {
    mailer: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailProvider {
    pub fn new(config: &EmailConfig) -> Result<Self, AppError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("SMTP_HOST is not set")))?;

        let mut builder = SmtpTransport::starttls_relay(host)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid SMTP relay {}: {}", host, e)))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(10)));
        if let (Some(user), Some(password)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let from: Mailbox = config.from_address.parse().map_err(|e: lettre::address::AddressError| {
            AppError::ConfigError(anyhow::anyhow!("Invalid EMAIL_FROM: {}", e))
        })?;

        tracing::info!(host = %host, port = config.smtp_port, "SMTP email provider initialized");

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    fn build_message(&self, message: &EmailMessage) -> Result<Message, AppError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| AppError::bad_request(format!("Invalid recipient: {}", e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html.clone()),
                    ),
            )
            .map_err(AppError::from)
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError> {
        let email = self.build_message(&message)?;

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || {
            let mailer = self.mailer.clone();
            let email = email.clone();
            let to = message.to.clone();
            async move {
                // lettre's SMTP transport is blocking.
                let result = tokio::task::spawn_blocking(move || mailer.send(&email))
                    .await
                    .map_err(|e| backoff::Error::permanent(AppError::InternalError(e.into())))?;

                match result {
                    Ok(_) => Ok(()),
                    Err(e) if e.is_transient() => {
                        tracing::warn!(error = %e, to = %to, "Transient SMTP failure, retrying");
                        Err(backoff::Error::transient(AppError::EmailError(e.to_string())))
                    }
                    Err(e) => Err(backoff::Error::permanent(AppError::EmailError(e.to_string()))),
                }
            }
        })
        .await?;

        tracing::info!(to = %message.to, subject = %message.subject, "Email sent successfully");
        Ok(())
    }
}

// ==================== Log ====================

/// Logs instead of sending. Keeps what it "sent" for inspection.
#[derive(Default)]
pub struct LogEmailProvider {
    outbox: Mutex<Vec<EmailMessage>>,
}

impl LogEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl EmailProvider for LogEmailProvider {
    async fn send(&self, message: EmailMessage) -> Result<(), AppError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text,
            "Email (log backend)"
        );
        match self.outbox.lock() {
            Ok(mut outbox) => outbox.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(())
    }
}

pub fn build_provider(config: &EmailConfig) -> Result<Arc<dyn EmailProvider>, AppError> {
    Ok(match config.backend {
        EmailBackend::Smtp => Arc::new(SmtpEmailProvider::new(config)?),
        EmailBackend::Log => Arc::new(LogEmailProvider::new()),
    })
}

// ==================== Mailer ====================

#[derive(Clone)]
pub struct Mailer {
    provider: Arc<dyn EmailProvider>,
}

impl Mailer {
    pub fn new(provider: Arc<dyn EmailProvider>) -> Self {
        Self { provider }
    }

    pub async fn send(&self, to: &str, content: &EmailContent) -> Result<(), AppError> {
        self.provider.send(EmailMessage::new(to, content)).await
    }

    /// Send and swallow failures. Returns whether the email went out.
    pub async fn send_best_effort(&self, to: &str, content: &EmailContent) -> bool {
        match self.send(to, content).await {
            Ok(()) => true,
            Err(e) => {
                metrics::record_email_failure(content.template);
                tracing::error!(
                    error = %e,
                    to = %to,
                    template = content.template,
                    "Failed to send email"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl EmailProvider for FailingProvider {
        async fn send(&self, _message: EmailMessage) -> Result<(), AppError> {
            Err(AppError::EmailError("relay down".to_string()))
        }
    }

    fn content() -> EmailContent {
        EmailContent {
            template: "test",
            subject: "Hello".to_string(),
            text: "Body".to_string(),
            html: "<p>Body</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn log_provider_records_messages() {
        let provider = Arc::new(LogEmailProvider::new());
        let mailer = Mailer::new(provider.clone());
        assert!(mailer.send_best_effort("a@example.com", &content()).await);
        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@example.com");
        assert_eq!(sent[0].subject, "Hello");
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let mailer = Mailer::new(Arc::new(FailingProvider));
        assert!(!mailer.send_best_effort("a@example.com", &content()).await);
        assert!(mailer.send("a@example.com", &content()).await.is_err());
    }

    #[test]
    fn smtp_provider_requires_host() {
        let config = crate::config::tests::test_config().email;
        assert!(SmtpEmailProvider::new(&config).is_err());
    }
}
