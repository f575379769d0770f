use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::app::{AdwatchError, Result};
use crate::domain::RawItem;
use crate::fetcher::{FetcherConfig, SourceFetcher};

/// Fetches listing pages with a plain GET and queries the returned markup.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("adwatch/{}", env!("CARGO_PKG_VERSION")));

        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, selector: &str) -> Result<Vec<RawItem>> {
        let base = Url::parse(url)?;

        let body = self
            .client
            .get(base.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        extract_posts(&body, &base, selector)
    }
}

/// Pull one [`RawItem`] per element matching `selector` out of `html`.
///
/// The post's own anchor (or its first descendant anchor) supplies the link,
/// resolved against `base`, and the title text. Posts without an anchor or
/// `href` come back with an empty link.
pub fn extract_posts(html: &str, base: &Url, selector: &str) -> Result<Vec<RawItem>> {
    let post_selector =
        Selector::parse(selector).map_err(|_| AdwatchError::Selector(selector.to_string()))?;
    let anchor_selector =
        Selector::parse("a").map_err(|_| AdwatchError::Selector("a".to_string()))?;

    let document = Html::parse_document(html);

    let items = document
        .select(&post_selector)
        .map(|post| {
            let anchor = if post.value().name() == "a" {
                Some(post)
            } else {
                post.select(&anchor_selector).next()
            };

            match anchor {
                Some(a) => RawItem {
                    link: resolve_href(&a, base).unwrap_or_default(),
                    text: a.text().collect::<Vec<_>>().join(" "),
                },
                None => RawItem {
                    link: String::new(),
                    text: post.text().collect::<Vec<_>>().join(" "),
                },
            }
        })
        .collect();

    Ok(items)
}

fn resolve_href(anchor: &ElementRef<'_>, base: &Url) -> Option<String> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(String::from)
}
