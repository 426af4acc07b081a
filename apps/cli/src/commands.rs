//! CLI definition, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use tocscraper_core::{
    AdapterFactory, BatchConfig, BatchReport, ProgressReporter, ScrapeResult, ScrapeSourceConfig,
    load_jurisdictions, run_batch, scrape_source,
};
use tocscraper_crawler::ExtractPhase;
use tocscraper_shared::{
    AppConfig, ExtractConfig, Platform, TreeConfig, init_config, load_config, load_config_from,
    output_slug,
};

use crate::browser::ChromeFactory;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// tocscraper: crawl lazily loaded legal-code TOCs into JSON.
#[derive(Parser)]
#[command(
    name = "tocscraper",
    version,
    about = "Crawl a legal-code table of contents and extract every section into JSON.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Code URL to scrape (single mode).
    #[arg(conflicts_with = "csv", required_unless_present_any = ["csv", "init_config", "show_config"])]
    pub url: Option<String>,

    /// Output name for single mode (defaults to the URL host).
    #[arg(conflicts_with = "csv")]
    pub output_name: Option<String>,

    /// CSV of jurisdictions to scrape (batch mode).
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Directory for output and checkpoint files.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Force a platform instead of detecting it (e.g. amlegal, municode).
    #[arg(long)]
    pub platform: Option<Platform>,

    /// Config file (defaults to ~/.tocscraper/tocscraper.toml).
    #[arg(long, env = "TOCSCRAPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reuse leaf content from an existing checkpoint.
    #[arg(long)]
    pub resume: bool,

    /// Show the browser window.
    #[arg(long)]
    pub headful: bool,

    /// Write the default config file and exit.
    #[arg(long)]
    pub init_config: bool,

    /// Print the resolved configuration and exit.
    #[arg(long)]
    pub show_config: bool,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tocscraper=info",
        1 => "tocscraper=debug",
        _ => "tocscraper=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if cli.init_config {
        return cmd_init_config();
    }

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    if cli.show_config {
        return cmd_show_config(&config);
    }

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));

    let mut browser = config.browser.clone();
    if cli.headful {
        browser.headless = false;
    }

    match (&cli.csv, &cli.url) {
        (Some(csv), _) => {
            let factory = ChromeFactory::launch(&browser)?;
            cmd_batch(&factory, csv, &output_dir, &cli, &config).await
        }
        (None, Some(url)) => {
            let factory = ChromeFactory::launch(&browser)?;
            cmd_single(&factory, url, &output_dir, &cli, &config).await
        }
        (None, None) => Err(eyre!("either a URL or --csv is required")),
    }
}

fn cmd_init_config() -> Result<()> {
    let path = init_config()?;
    println!("Config written to {}", path.display());
    Ok(())
}

fn cmd_show_config(config: &AppConfig) -> Result<()> {
    let rendered =
        toml::to_string_pretty(config).map_err(|e| eyre!("failed to render config: {e}"))?;
    println!("{rendered}");
    Ok(())
}

async fn cmd_single<F: AdapterFactory>(
    factory: &F,
    url: &str,
    output_dir: &Path,
    cli: &Cli,
    config: &AppConfig,
) -> Result<()> {
    let source_url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let platform = match cli.platform {
        Some(platform) => platform,
        None => Platform::detect(&source_url).ok_or_else(|| {
            eyre!("cannot tell the platform of {source_url}; pass --platform")
        })?,
    };
    let output_name = output_slug(
        cli.output_name
            .as_deref()
            .or_else(|| source_url.host_str())
            .unwrap_or("output"),
    );

    info!(url, %platform, output = %output_name, "scraping source");

    let source = ScrapeSourceConfig {
        source_url: source_url.clone(),
        output_name,
        output_dir: output_dir.to_path_buf(),
        csv_file: None,
        tree: TreeConfig::from(config),
        extract: ExtractConfig::from(config),
        checkpoint_every: config.defaults.checkpoint_every,
        resume: cli.resume,
    };

    let adapter = factory.open(platform, &source_url).await?;
    let reporter = CliProgress::new();
    let result = scrape_source(Arc::new(adapter), &source, &reporter).await?;

    print_result(&result);
    Ok(())
}

async fn cmd_batch<F: AdapterFactory>(
    factory: &F,
    csv: &Path,
    output_dir: &Path,
    cli: &Cli,
    config: &AppConfig,
) -> Result<()> {
    let rows = load_jurisdictions(csv)?;
    info!(csv = %csv.display(), rows = rows.len(), "loaded jurisdictions");

    let batch = BatchConfig {
        csv_file: csv.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        platform: cli.platform,
        tree: TreeConfig::from(config),
        extract: ExtractConfig::from(config),
        checkpoint_every: config.defaults.checkpoint_every,
        resume: cli.resume,
    };

    let reporter = CliProgress::new();
    let report = run_batch(factory, &rows, &batch, &reporter).await;
    reporter.spinner.finish_and_clear();

    print_batch_report(&report);
    Ok(())
}

fn print_result(result: &ScrapeResult) {
    let stats = &result.stats;
    println!();
    println!("  Source scraped.");
    println!("  Sections:  {}", stats.sections);
    println!("  Leaves:    {}", stats.leaves);
    println!(
        "  Extracted: {} ({} reused, {} on retry)",
        stats.extracted, stats.reused, stats.recovered_on_retry
    );
    println!("  Failed:    {}", stats.failed);
    if stats.pending > 0 {
        println!("  Pending:   {}", stats.pending);
    }
    if !result.tree.warnings.is_empty() {
        println!("  Warnings:  {} (see log)", result.tree.warnings.len());
    }
    println!("  Output:    {}", result.output_path.display());
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();
}

fn print_batch_report(report: &BatchReport) {
    println!();
    println!(
        "  Batch complete: {} succeeded, {} failed, {} skipped",
        report.succeeded.len(),
        report.failed.len(),
        report.skipped.len()
    );
    for (name, result) in &report.succeeded {
        println!(
            "  ok     {name}: {}/{} leaves, {} failed",
            result.stats.extracted, result.stats.leaves, result.stats.failed
        );
    }
    for (name, error) in &report.failed {
        println!("  FAILED {name}: {error}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn leaf_processed(&self, phase: ExtractPhase, done: usize, total: usize) {
        let label = match phase {
            ExtractPhase::First => "Extracting",
            ExtractPhase::Retry => "Retrying",
        };
        self.spinner.set_message(format!("{label} [{done}/{total}]"));
    }

    fn done(&self, result: &ScrapeResult) {
        self.spinner.set_message(format!(
            "Wrote {} ({} sections)",
            result.output_path.display(),
            result.stats.sections
        ));
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}
