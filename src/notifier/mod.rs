//! Consolidated notification of a cycle's new listings.
//!
//! One message per cycle, covering every source that produced something new.

pub mod smtp;

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::Result;
use crate::domain::CycleResult;

pub use smtp::SmtpNotifier;

#[async_trait]
pub trait Notifier {
    /// Deliver one message describing every new item in `result`.
    async fn notify(&self, result: &CycleResult) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Email delivery. Without it the digest is only logged.
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Use STARTTLS instead of implicit TLS
    pub starttls: bool,
    pub username: String,
    /// Prefer setting `ADWATCH_SMTP_PASSWORD` over storing it here
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 465,
            starttls: false,
            username: String::new(),
            password: None,
            from: String::new(),
            to: Vec::new(),
            subject: "New Listings Alert".to_string(),
            timeout_secs: 30,
        }
    }
}

impl SmtpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Build the notifier described by `config`.
pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier + Send + Sync>> {
    let notifier: Arc<dyn Notifier + Send + Sync> = match config.smtp {
        Some(ref smtp) => Arc::new(SmtpNotifier::new(smtp)?),
        None => Arc::new(LogNotifier),
    };
    Ok(notifier)
}

/// Writes the digest to the log instead of sending it anywhere.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, result: &CycleResult) -> Result<()> {
        for (label, update) in result.iter() {
            for item in &update.items {
                info!(source = %label, link = %item.link, "New post: {}", item.display_title());
            }
        }
        Ok(())
    }
}

/// HTML body of the digest.
pub fn render_html(result: &CycleResult) -> String {
    let mut html = String::from("<h3>New posts detected:</h3>");

    for (label, update) in result.iter() {
        let _ = write!(
            html,
            "<h4>{} (<a href=\"{}\">Link</a>)</h4><ul>",
            encode_text(label),
            encode_double_quoted_attribute(&update.url)
        );
        for item in &update.items {
            let _ = write!(
                html,
                "<li><a href=\"{}\">{}</a></li>",
                encode_double_quoted_attribute(&item.link),
                encode_text(item.display_title())
            );
        }
        html.push_str("</ul>");
    }

    html
}

/// Plain-text alternative of the digest.
pub fn render_text(result: &CycleResult) -> String {
    let mut text = String::from("New posts detected:\n");

    for (label, update) in result.iter() {
        let _ = writeln!(text, "\n{} ({})", label, update.url);
        for item in &update.items {
            let _ = writeln!(text, "  - {}: {}", item.display_title(), item.link);
        }
    }

    text
}
