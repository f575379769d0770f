use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::app::{AdwatchError, Result};
use crate::domain::RawItem;
use crate::fetcher::{FetcherConfig, SourceFetcher};

/// Chrome-based fetcher using chromiumoxide, for listing pages that need
/// JavaScript to render.
///
/// The browser is launched on first use and shared; every fetch gets its own
/// page which is closed before returning.
pub struct ChromeFetcher {
    config: FetcherConfig,
    browser: Mutex<Option<Arc<Browser>>>,
}

impl ChromeFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    async fn launch(&self) -> Result<Browser> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-notifications")
            .arg("--disable-popup-blocking")
            .arg("--blink-settings=imagesEnabled=false");

        if !self.config.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(|e| AdwatchError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            AdwatchError::Browser(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        info!("Browser launched");
        Ok(browser)
    }

    async fn browser(&self) -> Result<Arc<Browser>> {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.as_ref() {
            return Ok(browser.clone());
        }

        let browser = Arc::new(self.launch().await?);
        *guard = Some(browser.clone());
        Ok(browser)
    }

    /// Drop the cached browser so the next fetch relaunches it.
    async fn discard_browser(&self) {
        if self.browser.lock().await.take().is_some() {
            warn!("Discarding browser after page failure");
        }
    }

    async fn query_page(&self, page: &Page, url: &str, selector: &str) -> Result<Vec<RawItem>> {
        if let Some(ref ua) = self.config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| AdwatchError::Browser(format!("Failed to set user agent: {}", e)))?;
        }

        // goto resolves once the navigation has loaded
        page.goto(url)
            .await
            .map_err(|e| AdwatchError::Browser(format!("Navigation failed: {}", e)))?;

        let script = posts_script(selector)?;
        let deadline = Instant::now() + self.config.wait_for_posts();

        // Posts may be inserted after load; poll until they show up.
        loop {
            let items: Vec<RawItem> = page
                .evaluate(script.clone())
                .await
                .map_err(|e| AdwatchError::Browser(format!("Script execution failed: {}", e)))?
                .into_value()
                .map_err(|e| AdwatchError::Browser(format!("Failed to parse result: {:?}", e)))?;

            if !items.is_empty() || Instant::now() >= deadline {
                return Ok(items);
            }

            sleep(self.config.poll_interval()).await;
        }
    }
}

#[async_trait]
impl SourceFetcher for ChromeFetcher {
    async fn fetch(&self, url: &str, selector: &str) -> Result<Vec<RawItem>> {
        let browser = self.browser().await?;

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                self.discard_browser().await;
                return Err(AdwatchError::Browser(format!("Failed to create page: {}", e)));
            }
        };

        // A timeout may drop this future mid-query; the guard still closes the tab.
        let guard = PageGuard::new(page.clone());
        let result = self.query_page(&page, url, selector).await;
        guard.close().await;

        result
    }
}

#[async_trait]
trait ClosePage: Send + Sized + 'static {
    async fn close_page(self) -> Result<()>;
}

#[async_trait]
impl ClosePage for Page {
    async fn close_page(self) -> Result<()> {
        self.close()
            .await
            .map_err(|e| AdwatchError::Browser(format!("Failed to close page: {}", e)))
    }
}

/// Closes the page exactly once: explicitly via [`PageGuard::close`], or in
/// a spawned task when dropped before that.
struct PageGuard<P: ClosePage> {
    page: Option<P>,
}

impl<P: ClosePage> PageGuard<P> {
    fn new(page: P) -> Self {
        Self { page: Some(page) }
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close_page().await {
                debug!("{}", e);
            }
        }
    }
}

impl<P: ClosePage> Drop for PageGuard<P> {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.close_page().await {
                    debug!("{}", e);
                }
            });
        }
    }
}

/// In-page script returning `[{link, text}]`, one entry per post.
fn posts_script(selector: &str) -> Result<String> {
    let selector = serde_json::to_string(selector)
        .map_err(|_| AdwatchError::Selector(selector.to_string()))?;

    Ok(format!(
        r#"
        (() => {{
            const posts = document.querySelectorAll({selector});
            return Array.from(posts).map(post => {{
                const anchor = post.matches('a') ? post : post.querySelector('a');
                return {{
                    link: anchor && anchor.href ? anchor.href : '',
                    text: (anchor || post).innerText || ''
                }};
            }});
        }})()
        "#
    ))
}
