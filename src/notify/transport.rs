//! Mail transports: Postmark over HTTP, SMTP via lettre, or none.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::email_type::EmailType;
use super::templates::RenderedEmail;
use crate::config::{EmailSettings, MailConfig};
use crate::error::DeliveryError;

/// A message with sender details attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub email_type: EmailType,
    pub from: String,
    pub reply_to: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl OutgoingEmail {
    pub fn new(rendered: RenderedEmail, settings: &EmailSettings) -> Self {
        Self {
            email_type: rendered.email_type,
            from: settings.from_address.clone(),
            reply_to: settings.reply_to.clone(),
            to: rendered.to,
            subject: rendered.subject,
            html_body: rendered.html_body,
            text_body: rendered.text_body,
        }
    }
}

/// Something that can hand a message to a mail provider.
#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Send one message, returning the provider's message id.
    async fn send(&self, email: &OutgoingEmail) -> Result<String, DeliveryError>;
}

/// Build the transport selected by configuration.
pub fn from_config(config: &MailConfig) -> Arc<dyn MailTransport> {
    match config {
        MailConfig::Postmark {
            server_token,
            base_url,
        } => Arc::new(PostmarkTransport::new(server_token.clone(), base_url.clone())),
        MailConfig::Smtp {
            host,
            port,
            username,
            password,
        } => Arc::new(SmtpMailer::new(
            host.clone(),
            *port,
            username.clone(),
            password.clone(),
        )),
        MailConfig::Disabled => Arc::new(DisabledTransport),
    }
}

// ── Postmark ────────────────────────────────────────────────────────

pub struct PostmarkTransport {
    client: reqwest::Client,
    server_token: SecretString,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PostmarkResponse {
    #[serde(rename = "MessageID")]
    message_id: String,
}

impl PostmarkTransport {
    pub fn new(server_token: SecretString, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            server_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn transport_error(reason: impl std::fmt::Display) -> DeliveryError {
        DeliveryError::Transport {
            provider: "postmark".into(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl MailTransport for PostmarkTransport {
    fn name(&self) -> &str {
        "postmark"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<String, DeliveryError> {
        let body = json!({
            "From": email.from,
            "ReplyTo": email.reply_to,
            "To": email.to,
            "Subject": email.subject,
            "HtmlBody": email.html_body,
            "TextBody": email.text_body,
            "Tag": email.email_type.as_str(),
            "MessageStream": "outbound",
        });

        let response = self
            .client
            .post(format!("{}/email", self.base_url))
            .header("Accept", "application/json")
            .header("X-Postmark-Server-Token", self.server_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PostmarkResponse = response.json().await.map_err(Self::transport_error)?;
        Ok(parsed.message_id)
    }
}

// ── SMTP ────────────────────────────────────────────────────────────

pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
}

impl SmtpMailer {
    pub fn new(host: String, port: u16, username: String, password: SecretString) -> Self {
        Self {
            host,
            port,
            username,
            password,
        }
    }

    fn transport_error(reason: impl std::fmt::Display) -> DeliveryError {
        DeliveryError::Transport {
            provider: "smtp".into(),
            reason: reason.to_string(),
        }
    }
}

fn mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build the MIME message. The Message-ID doubles as the returned id.
fn build_message(email: &OutgoingEmail) -> Result<(Message, String), DeliveryError> {
    let message_id = format!("<{}@cancel-flow>", uuid::Uuid::new_v4());
    let message = Message::builder()
        .from(mailbox(&email.from)?)
        .reply_to(mailbox(&email.reply_to)?)
        .to(mailbox(&email.to)?)
        .subject(email.subject.clone())
        .message_id(Some(message_id.clone()))
        .multipart(MultiPart::alternative_plain_html(
            email.text_body.clone(),
            email.html_body.clone(),
        ))
        .map_err(SmtpMailer::transport_error)?;
    Ok((message, message_id))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<String, DeliveryError> {
        let (message, message_id) = build_message(email)?;

        let creds = Credentials::new(
            self.username.clone(),
            self.password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::relay(&self.host)
            .map_err(Self::transport_error)?
            .port(self.port)
            .credentials(creds)
            .build();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(Self::transport_error)?
            .map_err(Self::transport_error)?;

        Ok(message_id)
    }
}

// ── Disabled ────────────────────────────────────────────────────────

/// Used when no provider is configured.
pub struct DisabledTransport;

#[async_trait]
impl MailTransport for DisabledTransport {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn send(&self, _email: &OutgoingEmail) -> Result<String, DeliveryError> {
        Err(DeliveryError::NotConfigured)
    }
}
