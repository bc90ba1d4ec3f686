//! Outbound notifications.
//!
//! The monitor only builds subject/body pairs; delivery belongs to a
//! [`Notifier`]. Sends are synchronous so the caller knows the outcome
//! before deciding whether an alert counts as delivered.

use chrono::{DateTime, Local};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SmtpConfig;

/// Subject line of the idle alert.
pub const IDLE_ALERT_SUBJECT: &str = "Idle alert: no user input detected";

/// Timestamp layout used in notification bodies.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A message handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
}

impl NotificationMessage {
    /// Create a new message.
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Errors that can occur while delivering a notification.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid mailbox '{address}': {source}")]
    InvalidAddress {
        address: String,
        source: lettre::address::AddressError,
    },

    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Notification task failed: {0}")]
    Task(String),
}

/// Sink for notification messages.
pub trait Notifier: Send + Sync {
    /// Deliver one message, blocking until the transport reports an outcome.
    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError>;
}

/// Mails notifications through an authenticated SMTP relay.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    /// Build the notifier, validating both mailboxes up front.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from)?;
        let to = parse_mailbox(&config.to)?;

        let builder = if config.use_encryption {
            SmtpTransport::starttls_relay(&config.host)?
        } else {
            warn!("SMTP encryption disabled, credentials are sent in clear text");
            SmtpTransport::builder_dangerous(&config.host)
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        info!(
            "Using SMTP relay {}:{} (encryption={})",
            config.host, config.port, config.use_encryption
        );

        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

impl Notifier for SmtpNotifier {
    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?;

        let response = self.transport.send(&email)?;
        debug!("SMTP relay answered {}", response.code());
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse()
        .map_err(|source| NotifyError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default)]
pub struct DryRunNotifier;

impl Notifier for DryRunNotifier {
    fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        info!("[DRY RUN] Would send '{}': {}", message.subject, message.body.replace('\n', " | "));
        Ok(())
    }
}

/// Send a message, logging the outcome and swallowing any failure.
///
/// Returns whether delivery succeeded.
pub fn send_best_effort(notifier: &dyn Notifier, message: &NotificationMessage) -> bool {
    match notifier.send(message) {
        Ok(()) => {
            info!("Notification sent: {}", message.subject);
            true
        }
        Err(e) => {
            warn!("Failed to send notification '{}': {}", message.subject, e);
            false
        }
    }
}

/// Format a timestamp the way notification bodies show it.
pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Build the idle alert for an episode.
///
/// The body reports the configured threshold, not the sampled idle time,
/// so the same episode always produces the same duration.
pub fn idle_alert(
    machine: &str,
    threshold_secs: u64,
    idle_since: DateTime<Local>,
    now: DateTime<Local>,
) -> NotificationMessage {
    #[allow(clippy::cast_precision_loss)]
    let minutes = threshold_secs as f64 / 60.0;
    let body = format!(
        "Machine: {machine}\n\
         No keyboard or mouse input for at least {minutes:.2} minutes.\n\
         Idle since: {}\n\
         Reported at: {}\n",
        format_timestamp(&idle_since),
        format_timestamp(&now),
    );
    NotificationMessage::new(IDLE_ALERT_SUBJECT, body)
}
