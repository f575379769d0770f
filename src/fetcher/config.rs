use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which [`SourceFetcher`](crate::fetcher::SourceFetcher) implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetcherBackend {
    /// Plain HTTP GET and markup query
    #[default]
    Http,
    /// Headless Chrome, for pages rendered by JavaScript
    Chrome,
}

/// Configuration for listing page fetchers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub backend: FetcherBackend,

    /// Upper bound on a single source fetch in seconds (default: 10)
    pub timeout_secs: u64,

    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// How long to wait for posts to appear after navigation, in milliseconds (default: 5000)
    pub wait_for_posts_ms: u64,

    /// Interval between checks while waiting for posts, in milliseconds (default: 250)
    pub poll_interval_ms: u64,

    /// User agent string to use
    pub user_agent: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            backend: FetcherBackend::Http,
            timeout_secs: 10,
            headless: true,
            wait_for_posts_ms: 5000,
            poll_interval_ms: 250,
            user_agent: Some(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn wait_for_posts(&self) -> Duration {
        Duration::from_millis(self.wait_for_posts_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = FetcherConfig::default();
        assert_eq!(config.backend, FetcherBackend::Http);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.headless);
        assert!(config.user_agent.is_some());
    }

    #[test]
    fn test_backend_from_toml() {
        let config: FetcherConfig = toml::from_str("backend = \"chrome\"").unwrap();
        assert_eq!(config.backend, FetcherBackend::Chrome);
        // Inherits defaults for the rest
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn test_poll_interval_has_floor() {
        let config = FetcherConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }
}
