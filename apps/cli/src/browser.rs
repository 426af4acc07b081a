//! Headless Chrome [`PageController`] and adapter factory.
//!
//! `headless_chrome` is synchronous, so every tab call runs on the blocking
//! thread pool.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use tocscraper_core::AdapterFactory;
use tocscraper_crawler::{PageController, ScriptedAdapter, profile_for};
use tocscraper_shared::{BrowserSettings, Platform, Result, ScraperError};

/// Chrome exits after this long without any DevTools traffic.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// ChromePage
// ---------------------------------------------------------------------------

/// One Chrome tab. The tab is closed when the page is dropped.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>, navigation_timeout: Duration) -> Self {
        tab.set_default_timeout(navigation_timeout);
        Self { tab }
    }

    /// Run a blocking tab call off the async runtime.
    async fn with_tab<T, E, F>(&self, what: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Display,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab).map_err(|e| e.to_string()))
            .await
            .map_err(|e| ScraperError::page(format!("{what}: browser task failed: {e}")))?
            .map_err(|e| ScraperError::page(format!("{what}: {e}")))
    }
}

impl PageController for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url, "navigating");
        let target = url.to_string();
        self.with_tab("navigate", move |tab| {
            tab.navigate_to(&target)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
        })
        .await
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let script = script.to_string();
        self.with_tab("evaluate", move |tab| {
            tab.evaluate(&script, false)
                .map(|object| object.value.unwrap_or(Value::Null))
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let selector = selector.to_string();
        self.with_tab("click", move |tab| {
            tab.find_element(&selector)
                .and_then(|element| element.click().map(|_| ()))
        })
        .await
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let target = selector.to_string();
        let found = self
            .with_tab("wait_for_selector", move |tab| {
                tab.wait_for_element_with_custom_timeout(&target, timeout)
                    .map(|_| ())
            })
            .await;
        found.map_err(|_| ScraperError::timeout(selector, timeout))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            debug!(error = %e, "failed to close tab");
        }
    }
}

// ---------------------------------------------------------------------------
// ChromeFactory
// ---------------------------------------------------------------------------

/// Launches one Chrome process and opens a fresh tab per source.
pub struct ChromeFactory {
    browser: Browser,
    navigation_timeout: Duration,
}

impl ChromeFactory {
    pub fn launch(settings: &BrowserSettings) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .build()
            .map_err(|e| ScraperError::config(format!("invalid browser options: {e}")))?;
        let browser = Browser::new(options)
            .map_err(|e| ScraperError::page(format!("failed to launch Chrome: {e}")))?;
        info!(headless = settings.headless, "browser launched");

        Ok(Self {
            browser,
            navigation_timeout: Duration::from_millis(settings.navigation_timeout_ms),
        })
    }
}

impl AdapterFactory for ChromeFactory {
    type Adapter = ScriptedAdapter<ChromePage>;

    async fn open(&self, platform: Platform, url: &Url) -> Result<Self::Adapter> {
        let browser = self.browser.clone();
        let tab = tokio::task::spawn_blocking(move || browser.new_tab())
            .await
            .map_err(|e| ScraperError::page(format!("browser task failed: {e}")))?
            .map_err(|e| ScraperError::page(format!("failed to open tab: {e}")))?;

        let page = ChromePage::new(tab, self.navigation_timeout);
        let adapter = ScriptedAdapter::open(page, profile_for(platform), url).await?;
        info!(%platform, url = %url, "page ready");

        Ok(adapter)
    }
}
