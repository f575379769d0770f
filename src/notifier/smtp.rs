use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::app::{AdwatchError, Result};
use crate::config::ConfigError;
use crate::domain::CycleResult;
use crate::notifier::{render_html, render_text, Notifier, SmtpConfig};

/// Sends the digest as a multipart (plain + HTML) email.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    subject: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let password = config
            .password
            .clone()
            .ok_or_else(|| ConfigError::Invalid("notifier.smtp: password is not set".into()))?;

        let from = parse_mailbox(&config.from)?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>>>()?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        }
        .map_err(|e| ConfigError::Invalid(format!("notifier.smtp: {}", e)))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.username.clone(), password))
            .timeout(Some(config.timeout()))
            .build();

        Ok(Self {
            transport,
            from,
            to,
            subject: config.subject.clone(),
        })
    }

    fn build_message(&self, result: &CycleResult) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(self.subject.clone());

        for to in &self.to {
            builder = builder.to(to.clone());
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                render_text(result),
                render_html(result),
            ))
            .map_err(|e| AdwatchError::Delivery(format!("Failed to build message: {}", e)))
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox> {
    addr.parse::<Mailbox>().map_err(|e| {
        ConfigError::Invalid(format!("notifier.smtp: invalid address '{}': {}", addr, e)).into()
    })
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, result: &CycleResult) -> Result<()> {
        let message = self.build_message(result)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AdwatchError::Delivery(e.to_string()))?;

        info!(
            recipients = self.to.len(),
            items = result.item_count(),
            "Email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IdentityRule, Item, RawItem, Source};

    fn config() -> SmtpConfig {
        SmtpConfig {
            username: "watcher@example.com".into(),
            password: Some("secret".into()),
            from: "Ad Watch <watcher@example.com>".into(),
            to: vec!["me@example.com".into(), "you@example.com".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_password_is_config_error() {
        let config = SmtpConfig {
            password: None,
            ..config()
        };
        let err = SmtpNotifier::new(&config).err().unwrap();
        assert!(matches!(err, AdwatchError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_recipient_is_config_error() {
        let config = SmtpConfig {
            to: vec!["not an address".into()],
            ..config()
        };
        let err = SmtpNotifier::new(&config).err().unwrap();
        assert!(matches!(err, AdwatchError::Config(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_message_has_all_recipients() {
        let notifier = SmtpNotifier::new(&config()).unwrap();

        let mut result = CycleResult::new();
        result.merge(
            &Source::new("A", "https://example.com/a"),
            vec![Item::from_raw(&RawItem::new("https://example.com/ad/1", "Car A"), IdentityRule::Link)
                .unwrap()],
        );

        let message = notifier.build_message(&result).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: New Listings Alert"));
        assert!(raw.contains("me@example.com"));
        assert!(raw.contains("you@example.com"));
        assert!(raw.contains("multipart/alternative"));
    }
}
