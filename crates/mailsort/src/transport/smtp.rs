//! SMTP sender for the dispatch pipeline.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::config::SmtpConfig;
use crate::secrets::{CredentialVault, SecretBackend};

use super::retry::{with_retry, RetryPolicy};
use super::{Result, TransportError};

/// One file attached to an outgoing message.
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<OutgoingAttachment>,
}

impl OutgoingMessage {
    fn build(&self) -> Result<Message> {
        let from: Mailbox = self.from.parse().map_err(|e| {
            TransportError::Permanent(format!("invalid sender '{}': {}", self.from, e))
        })?;
        let to: Mailbox = self.to.parse().map_err(|e| {
            TransportError::Permanent(format!("invalid recipient '{}': {}", self.to, e))
        })?;

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(self.body.clone()));
        for attachment in &self.attachments {
            multipart = multipart.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type(&attachment.content_type)),
            );
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject.clone())
            .multipart(multipart)
            .map_err(|e| TransportError::Permanent(format!("failed to build message: {}", e)))
    }
}

fn content_type(mime: &str) -> ContentType {
    ContentType::parse(mime)
        .or_else(|_| ContentType::parse("application/octet-stream"))
        .unwrap_or(ContentType::TEXT_PLAIN)
}

/// Sends one complete message.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<()>;
}

fn classify(e: lettre::transport::smtp::Error) -> TransportError {
    let code = e.status().map(|c| c.to_string());
    if matches!(code.as_deref(), Some("530" | "534" | "535")) {
        TransportError::AuthenticationFailed(e.to_string())
    } else if e.is_permanent() {
        TransportError::Permanent(e.to_string())
    } else {
        TransportError::Transient(e.to_string())
    }
}

/// Authenticated SMTP relay.
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    policy: RetryPolicy,
}

impl SmtpSender {
    /// Resolves the password for `user` from `vault` and verifies the relay accepts it.
    pub async fn open<B: SecretBackend>(
        config: &SmtpConfig,
        user: &str,
        vault: &CredentialVault<B>,
    ) -> crate::Result<Self> {
        let password = vault.resolve(user)?;
        let sender = Self::connect(config, user, &password).await?;

        if let Err(e) = vault.migrate_legacy(user) {
            warn!("Could not migrate credential for {}: {}", user, e);
        }

        Ok(sender)
    }

    pub async fn connect(
        config: &SmtpConfig,
        user: &str,
        password: &SecretString,
    ) -> Result<Self> {
        let invalid_host = |e: lettre::transport::smtp::Error| {
            TransportError::Permanent(format!("invalid SMTP host '{}': {}", config.server, e))
        };
        let builder = if config.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server).map_err(invalid_host)?
        } else if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
                .map_err(invalid_host)?
        } else {
            warn!("SMTP connection to {} is not encrypted", config.server);
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                user.to_string(),
                password.expose_secret().to_string(),
            ))
            .build();

        let policy = config.retry_policy();
        info!("Connecting to SMTP server at {}:{}", config.server, config.port);
        let handle = &transport;
        let accepted = with_retry(&policy, "SMTP connect", move || async move {
            handle.test_connection().await.map_err(classify)
        })
        .await?;
        if !accepted {
            return Err(TransportError::Transient(format!(
                "SMTP server {} rejected test connection",
                config.server
            )));
        }
        info!("Authenticated to SMTP server as {}", user);

        Ok(Self { transport, policy })
    }
}

#[async_trait]
impl MailSender for SmtpSender {
    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let email = message.build()?;
        let response = with_retry(&self.policy, "SMTP send", move || {
            let email = email.clone();
            async move { self.transport.send(email).await.map_err(classify) }
        })
        .await?;
        debug!("SMTP server answered {:?}", response.code());
        Ok(())
    }
}
