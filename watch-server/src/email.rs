//! SMTP notification delivery
//!
//! Alert mail is composed here and shipped through `lettre`'s async SMTP
//! transport. Delivery runs on its own worker fed by an mpsc queue so the
//! ingestion and sweeper paths never block on SMTP latency. When `SMTP_HOST`
//! is not configured the worker drains the queue and logs what it would have
//! sent; alert rows are still persisted upstream.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use shared::alert::{AlertKind, AlertSeverity};
use shared::util::format_millis;

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "alerts@storewatch.local";

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

/// Configuration for the SMTP delivery transport.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured and should be skipped.
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

/// A composed notification waiting for delivery.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Sends alert emails via SMTP.
pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send one message per recipient. Per-recipient failures are logged and
    /// do not abort the remaining recipients; the first error is returned.
    pub async fn send(&self, mail: &OutboundEmail) -> Result<(), EmailError> {
        let transport = self.transport()?;
        let mut first_err = None;

        for to in &mail.recipients {
            match self.build_message(to, mail) {
                Ok(message) => {
                    if let Err(e) = transport.send(message).await {
                        tracing::warn!(to = %to, error = %e, "Alert email delivery failed");
                        first_err.get_or_insert(EmailError::Transport(e));
                    } else {
                        tracing::info!(to = %to, subject = %mail.subject, "Alert email sent");
                    }
                }
                Err(e) => {
                    tracing::warn!(to = %to, error = %e, "Alert email could not be built");
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }

    fn build_message(&self, to: &str, mail: &OutboundEmail) -> Result<Message, EmailError> {
        Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to.parse()?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| EmailError::Build(e.to_string()))
    }
}

/// Mailer worker loop: drain the queue until shutdown, then stop. Failed
/// deliveries are logged and dropped — the next cooldown tick resends.
pub async fn run_mailer(
    mut rx: mpsc::Receiver<OutboundEmail>,
    mailer: Option<Mailer>,
    shutdown: CancellationToken,
) {
    tracing::info!(configured = mailer.is_some(), "Mailer worker started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            mail = rx.recv() => {
                let Some(mail) = mail else { break };
                match &mailer {
                    Some(mailer) => {
                        // Errors already logged per recipient; nothing to retry.
                        let _ = mailer.send(&mail).await;
                    }
                    None => {
                        tracing::warn!(
                            recipients = mail.recipients.len(),
                            subject = %mail.subject,
                            "SMTP not configured, dropping notification"
                        );
                    }
                }
            }
        }
    }

    tracing::info!("Mailer worker stopped");
}

/// Compose subject and body for an alert notification.
///
/// Startup and recovery mails carry a telemetry summary; offline mails lead
/// with urgency and the last-seen instant.
pub fn compose_alert(
    kind: AlertKind,
    severity: AlertSeverity,
    store_id: &str,
    store_name: &str,
    message: &str,
    telemetry_summary: Option<&str>,
    last_seen: Option<i64>,
) -> OutboundEmail {
    let label = if store_name.is_empty() {
        store_id.to_string()
    } else {
        format!("{store_name} ({store_id})")
    };

    let subject = match kind {
        AlertKind::Offline => format!("URGENT: store {label} is offline"),
        AlertKind::Recovery => format!("Recovered: store {label} is back online"),
        AlertKind::Startup => format!("Startup: store {label} began reporting"),
        AlertKind::SystemWarning => format!("Warning: store {label} system health"),
        AlertKind::CameraFailure => format!("Camera failure at store {label}"),
        AlertKind::Test => format!("Test alert for store {label}"),
    };

    let mut body = String::new();
    match kind {
        AlertKind::Offline => {
            body.push_str(&format!(
                "Store {label} has stopped sending heartbeats and is considered OFFLINE.\n\n"
            ));
            if let Some(ts) = last_seen {
                body.push_str(&format!("Last heartbeat: {}\n", format_millis(ts)));
            }
            body.push_str(
                "Please check power, network connectivity and the detection application \
                 at the store.\n",
            );
        }
        _ => {
            body.push_str(message);
            body.push('\n');
        }
    }
    if !matches!(kind, AlertKind::Offline) {
        if let Some(summary) = telemetry_summary {
            body.push_str(&format!("\nTelemetry: {summary}\n"));
        }
    }
    body.push_str(&format!("\nSeverity: {severity}\nAlert kind: {kind}\n"));

    OutboundEmail {
        recipients: Vec::new(),
        subject,
        body,
    }
}
