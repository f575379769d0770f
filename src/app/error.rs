use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum AdwatchError {
    #[error("Identity store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid post selector '{0}'")]
    Selector(String),

    #[error("Fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AdwatchError {
    /// True for errors that only invalidate a single source's contribution.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            AdwatchError::Http(_)
                | AdwatchError::Browser(_)
                | AdwatchError::Selector(_)
                | AdwatchError::FetchTimeout(_)
                | AdwatchError::InvalidUrl(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AdwatchError>;
