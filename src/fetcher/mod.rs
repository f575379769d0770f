//! Listing page fetchers.
//!
//! The detection pipeline only depends on [`SourceFetcher`]; how a page is
//! retrieved and queried stays behind this trait.

pub mod chrome;
pub mod config;
pub mod http_fetcher;

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::RawItem;

pub use chrome::ChromeFetcher;
pub use config::{FetcherBackend, FetcherConfig};
pub use http_fetcher::HttpFetcher;

#[async_trait]
pub trait SourceFetcher {
    /// Fetch `url` and return one raw item per element matching `selector`,
    /// in page order.
    async fn fetch(&self, url: &str, selector: &str) -> Result<Vec<RawItem>>;
}

/// Build the fetcher selected by `config.backend`.
pub fn from_config(config: &FetcherConfig) -> Result<Arc<dyn SourceFetcher + Send + Sync>> {
    let fetcher: Arc<dyn SourceFetcher + Send + Sync> = match config.backend {
        FetcherBackend::Http => Arc::new(HttpFetcher::new(config)?),
        FetcherBackend::Chrome => Arc::new(ChromeFetcher::new(config.clone())),
    };
    Ok(fetcher)
}
