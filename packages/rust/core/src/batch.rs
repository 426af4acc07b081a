//! Batch orchestration over a CSV of jurisdictions.
//!
//! Sources are processed strictly one after another. A failing source is
//! logged with its jurisdiction name and recorded in the report; it never
//! stops the batch.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};
use url::Url;

use tocscraper_crawler::TreeAdapter;
use tocscraper_shared::{
    ExtractConfig, Jurisdiction, Platform, Result, ScraperError, TreeConfig, output_slug,
};

use crate::pipeline::{ProgressReporter, ScrapeResult, ScrapeSourceConfig, scrape_source};

/// Opens a live adapter for one source.
///
/// The CLI implements this with a headless browser tab; tests use in-memory
/// sites.
pub trait AdapterFactory {
    type Adapter: TreeAdapter;

    fn open(
        &self,
        platform: Platform,
        url: &Url,
    ) -> impl Future<Output = Result<Self::Adapter>> + Send;
}

/// Load batch rows from a CSV with columns
/// `name, slug, base_url, code_url, platform, status`.
pub fn load_jurisdictions(path: &Path) -> Result<Vec<Jurisdiction>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ScraperError::Csv(format!("{}: {e}", path.display())))?;

    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| {
            row.map_err(|e| ScraperError::Csv(format!("{} row {}: {e}", path.display(), i + 2)))
        })
        .collect()
}

/// Settings shared by every source of a batch.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub csv_file: PathBuf,
    pub output_dir: PathBuf,
    /// Use this platform for every row instead of the row's own.
    pub platform: Option<Platform>,
    pub tree: TreeConfig,
    pub extract: ExtractConfig,
    pub checkpoint_every: usize,
    pub resume: bool,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<(String, ScrapeResult)>,
    /// Jurisdiction name and error message.
    pub failed: Vec<(String, String)>,
    /// Rows whose status is not `ready`.
    pub skipped: Vec<String>,
}

/// Scrape every ready row, one at a time.
#[instrument(skip_all, fields(csv = %config.csv_file.display(), rows = rows.len()))]
pub async fn run_batch<F: AdapterFactory>(
    factory: &F,
    rows: &[Jurisdiction],
    config: &BatchConfig,
    progress: &dyn ProgressReporter,
) -> BatchReport {
    let mut report = BatchReport::default();
    let ready = rows.iter().filter(|r| r.is_ready()).count();
    info!(ready, total = rows.len(), "starting batch");

    for row in rows {
        if !row.is_ready() {
            report.skipped.push(row.name.clone());
            continue;
        }

        let position = report.succeeded.len() + report.failed.len() + 1;
        progress.phase(&format!("[{position}/{ready}] {}", row.name));
        match scrape_row(factory, row, config, progress).await {
            Ok(result) => {
                info!(
                    jurisdiction = %row.name,
                    path = %result.output_path.display(),
                    "source complete"
                );
                report.succeeded.push((row.name.clone(), result));
            }
            Err(e) => {
                warn!(jurisdiction = %row.name, error = %e, "source failed, continuing");
                report.failed.push((row.name.clone(), e.to_string()));
            }
        }
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "batch complete"
    );
    report
}

async fn scrape_row<F: AdapterFactory>(
    factory: &F,
    row: &Jurisdiction,
    config: &BatchConfig,
    progress: &dyn ProgressReporter,
) -> Result<ScrapeResult> {
    let raw_url = row
        .entry_url()
        .ok_or_else(|| ScraperError::validation("row has neither code_url nor base_url"))?;
    let url = Url::parse(raw_url)
        .map_err(|e| ScraperError::validation(format!("invalid URL '{raw_url}': {e}")))?;
    let platform = resolve_platform(row, &url, config.platform)?;

    let adapter = factory.open(platform, &url).await?;
    let name = if row.slug.trim().is_empty() {
        &row.name
    } else {
        &row.slug
    };

    let source = ScrapeSourceConfig {
        source_url: url,
        output_name: output_slug(name),
        output_dir: config.output_dir.clone(),
        csv_file: Some(config.csv_file.display().to_string()),
        tree: config.tree.clone(),
        extract: config.extract.clone(),
        checkpoint_every: config.checkpoint_every,
        resume: config.resume,
    };
    scrape_source(Arc::new(adapter), &source, progress).await
}

/// Override, else the row's `platform` column, else detection from the URL.
fn resolve_platform(row: &Jurisdiction, url: &Url, forced: Option<Platform>) -> Result<Platform> {
    if let Some(platform) = forced {
        return Ok(platform);
    }
    if !row.platform.trim().is_empty() {
        return row.platform.parse();
    }
    Platform::detect(url).ok_or_else(|| {
        ScraperError::validation(format!("cannot tell the platform of {url}"))
    })
}
