//! Single-source pipeline: discover → flatten → extract → write.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use tocscraper_crawler::{
    ExtractObserver, ExtractPhase, LeafExtractor, LeafProgress, ScrapeSession, TreeAdapter,
    TreeBuilder, TreeReport,
};
use tocscraper_shared::{
    ExtractConfig, OutputMetadata, Result, ScrapeOutput, ScrapeStats, TreeConfig,
};

use crate::output::{self, Checkpoint};
use crate::toc;

/// Configuration for scraping one source.
#[derive(Debug, Clone)]
pub struct ScrapeSourceConfig {
    /// The page the adapter was opened on.
    pub source_url: Url,
    /// Artifact base name, without extension.
    pub output_name: String,
    pub output_dir: PathBuf,
    /// The batch CSV this source came from, recorded in metadata.
    pub csv_file: Option<String>,
    pub tree: TreeConfig,
    pub extract: ExtractConfig,
    /// Write a checkpoint every this many processed leaves; 0 disables it.
    pub checkpoint_every: usize,
    /// Seed scraped keys from an existing checkpoint.
    pub resume: bool,
}

/// Result of scraping one source.
#[derive(Debug)]
pub struct ScrapeResult {
    pub output_path: PathBuf,
    pub session_id: Uuid,
    pub stats: ScrapeStats,
    pub tree: TreeReport,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each leaf of an extraction phase.
    fn leaf_processed(&self, phase: ExtractPhase, done: usize, total: usize);
    /// Called when a source completes.
    fn done(&self, result: &ScrapeResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn leaf_processed(&self, _phase: ExtractPhase, _done: usize, _total: usize) {}
    fn done(&self, _result: &ScrapeResult) {}
}

/// Scrape one source end to end and write its artifact.
///
/// Only structural failures (a missing TOC root, an unwritable output
/// directory) are returned as errors. Node- and leaf-level failures are
/// recorded in the artifact and counted in the stats.
#[instrument(skip_all, fields(url = %config.source_url, output = %config.output_name))]
pub async fn scrape_source<A: TreeAdapter>(
    adapter: Arc<A>,
    config: &ScrapeSourceConfig,
    progress: &dyn ProgressReporter,
) -> Result<ScrapeResult> {
    let start = Instant::now();
    let mut session = ScrapeSession::new(config.source_url.clone());
    info!(session = %session.id(), adapter = adapter.name(), "starting scrape");

    if config.resume {
        resume_from_checkpoint(&mut session, config)?;
    }

    // --- Phase 1: Discover ---
    progress.phase("Discovering table of contents");
    let (forest, tree_report) = TreeBuilder::new(Arc::clone(&adapter), config.tree.clone())
        .build()
        .await?;

    // --- Phase 2: Flatten ---
    progress.phase("Flattening");
    let sections = toc::flatten(&forest);
    session.set_tree(forest, sections);
    info!(
        roots = session.forest().len(),
        sections = session.sections().len(),
        "toc flattened"
    );

    // --- Phase 3: Extract ---
    progress.phase("Extracting leaf content");
    let observer = CheckpointObserver {
        progress,
        output_dir: &config.output_dir,
        output_name: &config.output_name,
        every: config.checkpoint_every,
        processed: AtomicUsize::new(0),
    };
    let extract_report = LeafExtractor::new(adapter.as_ref(), config.extract.clone())
        .run(&mut session, &observer)
        .await;

    // --- Phase 4: Write ---
    progress.phase("Writing output");
    let session_id = session.id();
    let sections = session.into_sections();
    let mut stats = ScrapeStats::from_sections(&sections);
    stats.reused = extract_report.reused;
    stats.recovered_on_retry = extract_report.recovered_on_retry;

    let artifact = ScrapeOutput {
        metadata: OutputMetadata {
            source_url: config.source_url.to_string(),
            output_name: config.output_name.clone(),
            scraper_name: adapter.name().to_string(),
            scraper_version: env!("CARGO_PKG_VERSION").to_string(),
            csv_file: config.csv_file.clone(),
            scraped_at: Utc::now(),
            stats: stats.clone(),
        },
        sections,
    };
    let output_path = output::write_output(&config.output_dir, &config.output_name, &artifact)?;

    if let Err(e) = Checkpoint::remove(&config.output_dir, &config.output_name) {
        warn!(error = %e, "failed to remove checkpoint");
    }

    let result = ScrapeResult {
        output_path,
        session_id,
        stats,
        tree: tree_report,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        sections = result.stats.sections,
        leaves = result.stats.leaves,
        extracted = result.stats.extracted,
        reused = result.stats.reused,
        recovered = result.stats.recovered_on_retry,
        failed = result.stats.failed,
        tree_warnings = result.tree.warnings.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "scrape complete"
    );

    Ok(result)
}

fn resume_from_checkpoint(session: &mut ScrapeSession, config: &ScrapeSourceConfig) -> Result<()> {
    let Some(checkpoint) = Checkpoint::load(&config.output_dir, &config.output_name)? else {
        info!("no checkpoint to resume from");
        return Ok(());
    };
    if checkpoint.source_url != config.source_url.as_str() {
        warn!(
            checkpoint_url = %checkpoint.source_url,
            "checkpoint belongs to a different source, ignoring it"
        );
        return Ok(());
    }
    let entries = checkpoint.entries.len();
    session.seed(checkpoint.into_entries());
    info!(entries, "resuming from checkpoint");
    Ok(())
}

// ---------------------------------------------------------------------------
// Extraction observer
// ---------------------------------------------------------------------------

/// Forwards leaf progress and writes a checkpoint every `every` leaves.
struct CheckpointObserver<'a> {
    progress: &'a dyn ProgressReporter,
    output_dir: &'a Path,
    output_name: &'a str,
    every: usize,
    processed: AtomicUsize,
}

impl ExtractObserver for CheckpointObserver<'_> {
    fn leaf_processed(&self, session: &ScrapeSession, progress: LeafProgress) {
        self.progress
            .leaf_processed(progress.phase, progress.done, progress.total);

        if self.every == 0 {
            return;
        }
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % self.every == 0 {
            let checkpoint = Checkpoint::from_session(session, self.output_name);
            if let Err(e) = checkpoint.write(self.output_dir) {
                warn!(error = %e, "failed to write checkpoint");
            }
        }
    }
}
