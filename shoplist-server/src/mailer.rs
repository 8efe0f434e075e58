//! Sending finished lists by email.
//!
//! Composition lives in `shoplist_core::notify`; this module owns the
//! transport and the send boundary, where transport errors are turned into
//! a message for the shopper instead of failing the request.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use shoplist_core::{compose, NotifyRejection, RecipientPolicy, Selection, ShoppingListMessage};
use tracing::{error, info};

use crate::config::SmtpConfig;

/// Port on which the relay expects TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Something that can deliver a composed list.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &ShoppingListMessage) -> Result<()>;
}

/// Authenticated SMTP relay over an encrypted connection.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("SMTP_FROM `{}` is not a valid mailbox", config.from))?;

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .with_context(|| format!("Failed to configure SMTP relay {}", config.host))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &ShoppingListMessage) -> Result<()> {
        let to = message
            .to
            .parse::<Mailbox>()
            .with_context(|| format!("`{}` is not a valid email address", message.to))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .context("Failed to build email")?;

        self.transport.send(email).await?;
        Ok(())
    }
}

/// What happened when the shopper asked for the list to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NotifyResult {
    Sent { to: String, message: String },
    Rejected { message: String },
    Failed { message: String },
}

impl NotifyResult {
    fn rejected(rejection: NotifyRejection) -> Self {
        Self::Rejected {
            message: rejection.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Sent { message, .. } | Self::Rejected { message } | Self::Failed { message } => {
                message
            }
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Check the preconditions, then hand the list to `transport`.
///
/// The transport is only called once every precondition holds.
pub async fn send_list(
    transport: Option<&dyn MailTransport>,
    recipients: Option<&RecipientPolicy>,
    selections: &[Selection],
    choice: Option<&str>,
) -> NotifyResult {
    let Some(transport) = transport else {
        return NotifyResult::rejected(NotifyRejection::NotConfigured);
    };

    let recipient = recipients.and_then(|policy| policy.resolve(choice));
    let message = match compose(selections, recipient) {
        Ok(message) => message,
        Err(rejection) => return NotifyResult::rejected(rejection),
    };

    match transport.send(&message).await {
        Ok(()) => {
            info!(
                "Sent shopping list with {} items to {}",
                selections.len(),
                message.to
            );
            NotifyResult::Sent {
                message: format!("Shopping list sent to {}.", message.to),
                to: message.to,
            }
        }
        Err(e) => {
            error!("Failed to send shopping list to {}: {:#}", message.to, e);
            NotifyResult::Failed {
                message: format!("Failed to send email: {:#}", e),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use shoplist_core::{AddressBook, Contact};
    use std::sync::Mutex;

    /// Transport that remembers every message instead of sending it.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Mutex<Vec<ShoppingListMessage>>,
        pub fail_with: Option<String>,
    }

    impl RecordingTransport {
        pub(crate) fn failing(cause: &str) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_with: Some(cause.to_string()),
            }
        }

        pub(crate) fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, message: &ShoppingListMessage) -> Result<()> {
            if let Some(cause) = &self.fail_with {
                return Err(anyhow!(cause.clone()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn book() -> RecipientPolicy {
        RecipientPolicy::AddressBook(AddressBook::new(vec![Contact {
            label: "Dottie".to_string(),
            address: "dottie@example.com".to_string(),
        }]))
    }

    fn list() -> Vec<Selection> {
        vec![Selection::new("Milk", 1)]
    }

    #[tokio::test]
    async fn test_send_list_delivers_message() {
        let transport = RecordingTransport::default();

        let result = send_list(Some(&transport), Some(&book()), &list(), Some("Dottie")).await;

        assert!(result.is_sent());
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "dottie@example.com");
        assert_eq!(sent[0].subject, "Your Shopping List");
    }

    #[tokio::test]
    async fn test_empty_list_never_reaches_transport() {
        let transport = RecordingTransport::default();

        let empty = send_list(Some(&transport), Some(&book()), &[], Some("Dottie")).await;
        let no_recipient = send_list(Some(&transport), Some(&book()), &list(), None).await;

        assert!(matches!(empty, NotifyResult::Rejected { .. }));
        assert!(matches!(no_recipient, NotifyResult::Rejected { .. }));
        assert_ne!(empty.message(), no_recipient.message());
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_no_recipient_policy_is_rejected() {
        let transport = RecordingTransport::default();

        let result = send_list(Some(&transport), None, &list(), Some("Dottie")).await;

        assert_eq!(
            result.message(),
            NotifyRejection::NoRecipient.to_string().as_str()
        );
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_transport_is_not_configured() {
        let result = send_list(None, Some(&book()), &list(), Some("Dottie")).await;

        assert_eq!(
            result,
            NotifyResult::Rejected {
                message: NotifyRejection::NotConfigured.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_with_cause() {
        let transport = RecordingTransport::failing("authentication failed");

        let result = send_list(Some(&transport), Some(&book()), &list(), Some("Dottie")).await;

        assert!(matches!(result, NotifyResult::Failed { .. }));
        assert_eq!(result.message(), "Failed to send email: authentication failed");
    }

    #[test]
    fn test_smtp_mailer_rejects_bad_sender() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 465,
            username: "user".to_string(),
            password: "secret".to_string(),
            from: "not a mailbox".to_string(),
        };

        assert!(SmtpMailer::new(&config).is_err());
    }
}
