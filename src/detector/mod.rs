//! Per-source new item detection.
//!
//! ```text
//! Source → SourceFetcher → RawItem → Item (identity) → diff against known
//! ```
//!
//! A detector never mutates the identity store; it only reads the frozen
//! snapshot it is given, so every source in a cycle sees the same known set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::app::{AdwatchError, Result};
use crate::domain::{IdentityRule, Item, RawItem, Source};
use crate::fetcher::SourceFetcher;

pub struct Detector {
    fetcher: Arc<dyn SourceFetcher + Send + Sync>,
    selector: String,
    rule: IdentityRule,
    timeout: Duration,
}

impl Detector {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher + Send + Sync>,
        selector: impl Into<String>,
        rule: IdentityRule,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            selector: selector.into(),
            rule,
            timeout,
        }
    }

    /// Fetch `source` once and return the items not in `known`, in page order.
    ///
    /// An empty page is not an error and yields nothing. Fetch failures and
    /// timeouts are returned to the caller, which must keep them isolated to
    /// this source.
    pub async fn detect(&self, source: &Source, known: &HashSet<String>) -> Result<Vec<Item>> {
        let raw = timeout(self.timeout, self.fetcher.fetch(&source.url, &self.selector))
            .await
            .map_err(|_| AdwatchError::FetchTimeout(self.timeout))??;

        if raw.is_empty() {
            warn!(
                source = %source.label,
                "No posts found, page structure may have changed"
            );
            return Ok(Vec::new());
        }

        let items = complete_items(&raw, self.rule);
        if items.is_empty() {
            warn!(
                source = %source.label,
                fetched = raw.len(),
                "Matched posts have no links, page structure may have changed"
            );
            return Ok(Vec::new());
        }

        let new_items = unseen(items, known);

        if new_items.is_empty() {
            debug!(source = %source.label, fetched = raw.len(), "No new posts");
        } else {
            info!(
                source = %source.label,
                fetched = raw.len(),
                new = new_items.len(),
                "Found new post(s)"
            );
        }

        Ok(new_items)
    }
}

/// Items from `raw` whose identifier is neither in `known` nor repeated
/// earlier in `raw`. Posts without a link are skipped.
pub fn diff_against_known(raw: &[RawItem], known: &HashSet<String>, rule: IdentityRule) -> Vec<Item> {
    unseen(complete_items(raw, rule), known)
}

/// Posts that yield an identity, in page order.
fn complete_items(raw: &[RawItem], rule: IdentityRule) -> Vec<Item> {
    raw.iter().filter_map(|r| Item::from_raw(r, rule)).collect()
}

fn unseen(items: Vec<Item>, known: &HashSet<String>) -> Vec<Item> {
    let mut seen = HashSet::new();

    items
        .into_iter()
        .filter(|item| !known.contains(&item.identifier))
        .filter(|item| seen.insert(item.identifier.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticFetcher(Vec<RawItem>);

    #[async_trait]
    impl SourceFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str, _selector: &str) -> Result<Vec<RawItem>> {
            Ok(self.0.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl SourceFetcher for FailingFetcher {
        async fn fetch(&self, _url: &str, selector: &str) -> Result<Vec<RawItem>> {
            Err(AdwatchError::Selector(selector.to_string()))
        }
    }

    struct HangingFetcher;

    #[async_trait]
    impl SourceFetcher for HangingFetcher {
        async fn fetch(&self, _url: &str, _selector: &str) -> Result<Vec<RawItem>> {
            futures::future::pending().await
        }
    }

    fn detector(fetcher: impl SourceFetcher + Send + Sync + 'static) -> Detector {
        Detector::new(
            Arc::new(fetcher),
            ".item",
            IdentityRule::Link,
            Duration::from_secs(10),
        )
    }

    fn source() -> Source {
        Source::new("A", "https://example.com/a")
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.identifier.as_str()).collect()
    }

    #[test]
    fn test_diff_excludes_known() {
        let raw = vec![RawItem::new("u1", "Car A"), RawItem::new("u2", "Car B")];
        let known: HashSet<String> = ["u1".to_string()].into();
        let new_items = diff_against_known(&raw, &known, IdentityRule::Link);
        assert_eq!(ids(&new_items), vec!["u2"]);
    }

    #[test]
    fn test_diff_dedups_within_page() {
        let raw = vec![
            RawItem::new("u1", "Car A"),
            RawItem::new("u1", "Car A (featured)"),
            RawItem::new("u2", "Car B"),
        ];
        let new_items = diff_against_known(&raw, &HashSet::new(), IdentityRule::Link);
        assert_eq!(ids(&new_items), vec!["u1", "u2"]);
        assert_eq!(new_items[0].title, "Car A");
    }

    #[test]
    fn test_diff_skips_incomplete_posts() {
        let raw = vec![RawItem::new("", "No link"), RawItem::new("u2", "Car B")];
        let new_items = diff_against_known(&raw, &HashSet::new(), IdentityRule::Link);
        assert_eq!(ids(&new_items), vec!["u2"]);
    }

    #[tokio::test]
    async fn test_second_run_against_same_state_finds_nothing() {
        let d = detector(StaticFetcher(vec![
            RawItem::new("u1", "Car A"),
            RawItem::new("u2", "Car B"),
        ]));
        let mut known = HashSet::new();

        let first = d.detect(&source(), &known).await.unwrap();
        assert_eq!(first.len(), 2);
        known.extend(first.into_iter().map(|i| i.identifier));

        let second = d.detect(&source(), &known).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_empty_page_yields_nothing_and_keeps_known() {
        let d = detector(StaticFetcher(vec![]));
        let known: HashSet<String> = ["u1".to_string()].into();

        let new_items = d.detect(&source(), &known).await.unwrap();
        assert!(new_items.is_empty());
        assert!(known.contains("u1"));
    }

    #[test]
    fn test_complete_items_empty_when_no_post_has_a_link() {
        let raw = vec![RawItem::new("", "Car A"), RawItem::new("   ", "Car B")];
        assert!(complete_items(&raw, IdentityRule::Link).is_empty());
    }

    #[tokio::test]
    async fn test_page_without_links_yields_nothing() {
        let d = detector(StaticFetcher(vec![
            RawItem::new("", "Car A"),
            RawItem::new("", "Car B"),
        ]));
        let new_items = d.detect(&source(), &HashSet::new()).await.unwrap();
        assert!(new_items.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_returned() {
        let d = detector(FailingFetcher);
        let err = d.detect(&source(), &HashSet::new()).await.unwrap_err();
        assert!(err.is_fetch_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fetch_times_out() {
        let d = detector(HangingFetcher);
        let err = d.detect(&source(), &HashSet::new()).await.unwrap_err();
        assert!(matches!(err, AdwatchError::FetchTimeout(t) if t == Duration::from_secs(10)));
    }
}
