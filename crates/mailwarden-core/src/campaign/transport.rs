//! Outbound mail transport

use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{
        header::{ContentType, HeaderName, HeaderValue},
        Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use mailwarden_storage::{EmailAccount, SmtpSecurity};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// SMTP endpoint of a sending account
#[derive(Debug, Clone)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security: SmtpSecurity,
}

impl From<&EmailAccount> for SmtpEndpoint {
    fn from(account: &EmailAccount) -> Self {
        Self {
            host: account.smtp_host.clone(),
            port: u16::try_from(account.smtp_port).unwrap_or(587),
            username: account.smtp_username.clone(),
            password: account.smtp_password.clone(),
            security: account.smtp_security,
        }
    }
}

/// A fully personalized message ready to go out
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub endpoint: SmtpEndpoint,
    pub from_email: String,
    pub from_name: Option<String>,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    /// `List-Unsubscribe` target
    pub list_unsubscribe: Option<String>,
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl TransportResult {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Delivers one message. Failures are reported in the result, never raised.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> TransportResult;
}

/// Generate a Message-ID for `hostname`
pub fn generate_message_id(hostname: &str) -> String {
    format!("<{}.{}@{}>", Uuid::new_v4(), Utc::now().timestamp(), hostname)
}

/// SMTP delivery through the sending account's own relay
pub struct SmtpTransport {
    hostname: String,
    timeout: Duration,
}

impl SmtpTransport {
    pub fn new(hostname: impl Into<String>, timeout: Duration) -> Self {
        Self {
            hostname: hostname.into(),
            timeout,
        }
    }

    fn build(&self, message: &OutboundMessage, message_id: &str) -> Result<Message, String> {
        let from = Mailbox::new(
            message.from_name.clone(),
            message
                .from_email
                .parse()
                .map_err(|e| format!("Invalid from address: {}", e))?,
        );
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| format!("Invalid to address: {}", e))?;

        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .message_id(Some(message_id.to_string()));

        if let Some(target) = &message.list_unsubscribe {
            builder = builder
                .raw_header(HeaderValue::new(
                    HeaderName::new_from_ascii_str("List-Unsubscribe"),
                    format!("<{}>", target),
                ))
                .raw_header(HeaderValue::new(
                    HeaderName::new_from_ascii_str("List-Unsubscribe-Post"),
                    "List-Unsubscribe=One-Click".to_string(),
                ));
        }

        let email = match &message.text {
            Some(text) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(text.clone()))
                    .singlepart(SinglePart::html(message.html.clone())),
            ),
            None => builder
                .header(ContentType::TEXT_HTML)
                .body(message.html.clone()),
        };

        email.map_err(|e| format!("Failed to build email: {}", e))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, message: &OutboundMessage) -> TransportResult {
        let message_id = generate_message_id(&self.hostname);
        let email = match self.build(message, &message_id) {
            Ok(email) => email,
            Err(e) => return TransportResult::failed(e),
        };

        let endpoint = &message.endpoint;
        let builder = match endpoint.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&endpoint.host),
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&endpoint.host)
            }
            SmtpSecurity::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &endpoint.host,
            )),
        };

        let mut builder = match builder {
            Ok(b) => b.port(endpoint.port),
            Err(e) => return TransportResult::failed(format!("Failed to create SMTP transport: {}", e)),
        };

        if let (Some(username), Some(password)) = (&endpoint.username, &endpoint.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = builder.timeout(Some(self.timeout)).build();

        match mailer.send(email).await {
            Ok(response) => {
                debug!(to = %message.to, code = %response.code(), "Email accepted by relay");
                TransportResult::sent(message_id)
            }
            Err(e) => TransportResult::failed(e.to_string()),
        }
    }
}

/// Accepts every message without delivering it
pub struct DryRunTransport {
    hostname: String,
}

impl DryRunTransport {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }
}

#[async_trait]
impl MailTransport for DryRunTransport {
    async fn send(&self, message: &OutboundMessage) -> TransportResult {
        let message_id = generate_message_id(&self.hostname);
        info!(
            to = %message.to,
            subject = %message.subject,
            message_id = %message_id,
            "Dry run: message not delivered"
        );
        TransportResult::sent(message_id)
    }
}
