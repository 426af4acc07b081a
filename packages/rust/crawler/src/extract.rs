//! Leaf content extraction with a two-phase extract-then-retry protocol.
//!
//! Phase 1 visits every leaf with the adapter's normal activation and a short
//! timeout. Leaves that fail are queued and revisited in phase 2 with the
//! adapter's fallback trigger and a longer timeout. A phase 2 failure is
//! terminal and recorded as `htmlError` on the section.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};

use tocscraper_shared::{ExtractConfig, Result, ScraperError};

use crate::adapters::TreeAdapter;
use crate::session::ScrapeSession;

static NON_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script, style, noscript").unwrap());

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractPhase {
    First,
    Retry,
}

/// Position of a processed leaf within its phase.
#[derive(Debug, Clone, Copy)]
pub struct LeafProgress {
    /// Index into `session.sections()`.
    pub section: usize,
    pub phase: ExtractPhase,
    /// Leaves processed so far in this phase, including this one.
    pub done: usize,
    /// Leaves queued for this phase.
    pub total: usize,
}

/// Called after every leaf, with the session in its updated state.
pub trait ExtractObserver: Sync {
    fn leaf_processed(&self, session: &ScrapeSession, progress: LeafProgress);
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl ExtractObserver for NoopObserver {
    fn leaf_processed(&self, _session: &ScrapeSession, _progress: LeafProgress) {}
}

/// Counts from one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub leaves: usize,
    pub extracted_first_pass: usize,
    /// Leaves satisfied from already-scraped keys without touching the page.
    pub reused: usize,
    pub recovered_on_retry: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// LeafExtractor
// ---------------------------------------------------------------------------

/// Populates `html` or `htmlError` on every leaf section of a session.
///
/// Leaves are processed strictly one at a time: activating a leaf mutates the
/// shared page.
pub struct LeafExtractor<'a, A> {
    adapter: &'a A,
    config: ExtractConfig,
}

impl<'a, A: TreeAdapter> LeafExtractor<'a, A> {
    pub fn new(adapter: &'a A, config: ExtractConfig) -> Self {
        Self { adapter, config }
    }

    #[instrument(skip_all, fields(adapter = self.adapter.name(), source = %session.source_url()))]
    pub async fn run(
        &self,
        session: &mut ScrapeSession,
        observer: &dyn ExtractObserver,
    ) -> ExtractReport {
        let leaves: Vec<usize> = session
            .sections()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_leaf())
            .map(|(i, _)| i)
            .collect();

        let mut report = ExtractReport {
            leaves: leaves.len(),
            ..ExtractReport::default()
        };
        info!(leaves = leaves.len(), "extracting leaf content");

        // Phase 1
        let mut failed: Vec<usize> = Vec::new();
        for (n, &index) in leaves.iter().enumerate() {
            let key = session.sections()[index].key.clone();

            if let Some(html) = session.scraped(&key).map(str::to_string) {
                debug!(key = %key, "reusing scraped content");
                session.sections_mut()[index].set_html(html);
                report.reused += 1;
            } else {
                match self.first_pass(&key).await {
                    Ok(html) => {
                        session.record(&key, &html);
                        session.sections_mut()[index].set_html(html);
                        report.extracted_first_pass += 1;
                    }
                    Err(e) => {
                        let error = ScraperError::LeafExtraction {
                            key: key.clone(),
                            message: e.to_string(),
                        };
                        debug!(error = %error, "queued for retry");
                        failed.push(index);
                    }
                }
                self.pause().await;
            }

            observer.leaf_processed(
                session,
                LeafProgress {
                    section: index,
                    phase: ExtractPhase::First,
                    done: n + 1,
                    total: leaves.len(),
                },
            );
        }

        // Phase 2
        if !failed.is_empty() {
            info!(count = failed.len(), "retrying failed leaves");
        }
        for (n, &index) in failed.iter().enumerate() {
            let key = session.sections()[index].key.clone();

            if let Some(html) = session.scraped(&key).map(str::to_string) {
                session.sections_mut()[index].set_html(html);
                report.reused += 1;
            } else {
                match self.retry(&key).await {
                    Ok(html) => {
                        session.record(&key, &html);
                        session.sections_mut()[index].set_html(html);
                        report.recovered_on_retry += 1;
                    }
                    Err(e) => {
                        let error = ScraperError::LeafExtractionRetry {
                            key: key.clone(),
                            message: e.to_string(),
                        };
                        warn!(error = %error, "leaf extraction failed");
                        session.sections_mut()[index].set_error(error.to_string());
                        report.failed += 1;
                    }
                }
                self.pause().await;
            }

            observer.leaf_processed(
                session,
                LeafProgress {
                    section: index,
                    phase: ExtractPhase::Retry,
                    done: n + 1,
                    total: failed.len(),
                },
            );
        }

        info!(
            extracted = report.extracted_first_pass,
            reused = report.reused,
            recovered = report.recovered_on_retry,
            failed = report.failed,
            "leaf extraction complete"
        );
        report
    }

    async fn first_pass(&self, key: &str) -> Result<String> {
        if !self.adapter.content_present(key).await? {
            self.adapter.activate(key).await?;
            self.adapter
                .wait_for_content(key, self.config.first_pass_timeout)
                .await?;
        }
        self.read_content(key).await
    }

    async fn retry(&self, key: &str) -> Result<String> {
        self.adapter.activate_fallback(key).await?;
        self.adapter
            .wait_for_content(key, self.config.retry_timeout)
            .await?;
        self.read_content(key).await
    }

    async fn read_content(&self, key: &str) -> Result<String> {
        let raw = self
            .adapter
            .extract_leaf_content(key)
            .await?
            .ok_or_else(|| ScraperError::page(format!("content region for {key} is missing")))?;
        let html = clean_content(&raw);
        if html.is_empty() {
            return Err(ScraperError::page(format!("content region for {key} is empty")));
        }
        Ok(html)
    }

    async fn pause(&self) {
        if !self.config.leaf_delay.is_zero() {
            tokio::time::sleep(self.config.leaf_delay).await;
        }
    }
}

/// Remove `script`, `style` and `noscript` elements from a content block.
///
/// The block is re-serialized from the parsed fragment, so the result is
/// normalized markup whatever the casing or quoting of the input.
pub fn clean_content(html: &str) -> String {
    let mut doc = Html::parse_fragment(html);
    let dropped: Vec<_> = doc.select(&NON_CONTENT).map(|el| (*el).id()).collect();
    for id in dropped {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
    doc.root_element().inner_html().trim().to_string()
}
