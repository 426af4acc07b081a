//! Application configuration for tocscraper.
//!
//! User config lives at `~/.tocscraper/tocscraper.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScraperError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tocscraper.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tocscraper";

// ---------------------------------------------------------------------------
// Config structs (matching tocscraper.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Tree discovery tunables.
    #[serde(default)]
    pub crawl: CrawlSettings,

    /// Leaf extraction tunables.
    #[serde(default)]
    pub extract: ExtractSettings,

    /// Browser session settings.
    #[serde(default)]
    pub browser: BrowserSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory output artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Write a resume checkpoint after this many processed leaves (0 disables).
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_checkpoint_every() -> usize {
    25
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Expansion triggers fired concurrently per batch (fixpoint strategy).
    #[serde(default = "default_max_concurrent_expansions")]
    pub max_concurrent_expansions: usize,

    /// Upper bound on fixpoint rounds; guards against flickering collapsed state.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Hard depth cap for tree traversal.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Polls for children after expanding a node (depth-first strategy).
    #[serde(default = "default_expand_poll_attempts")]
    pub expand_poll_attempts: u32,

    /// Interval between child polls, in ms.
    #[serde(default = "default_expand_poll_interval_ms")]
    pub expand_poll_interval_ms: u64,

    /// Upper bound on waiting for loading indicators to clear, in ms.
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_concurrent_expansions: default_max_concurrent_expansions(),
            max_rounds: default_max_rounds(),
            max_depth: default_max_depth(),
            expand_poll_attempts: default_expand_poll_attempts(),
            expand_poll_interval_ms: default_expand_poll_interval_ms(),
            settle_timeout_ms: default_settle_timeout_ms(),
        }
    }
}

fn default_max_concurrent_expansions() -> usize {
    10
}
fn default_max_rounds() -> u32 {
    50
}
fn default_max_depth() -> usize {
    20
}
fn default_expand_poll_attempts() -> u32 {
    5
}
fn default_expand_poll_interval_ms() -> u64 {
    500
}
fn default_settle_timeout_ms() -> u64 {
    10_000
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractSettings {
    /// First-pass wait for a leaf's content region, in ms.
    #[serde(default = "default_first_pass_timeout_ms")]
    pub first_pass_timeout_ms: u64,

    /// Retry-pass wait for a leaf's content region, in ms.
    #[serde(default = "default_retry_timeout_ms")]
    pub retry_timeout_ms: u64,

    /// Pause between leaves, in ms.
    #[serde(default = "default_leaf_delay_ms")]
    pub leaf_delay_ms: u64,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            first_pass_timeout_ms: default_first_pass_timeout_ms(),
            retry_timeout_ms: default_retry_timeout_ms(),
            leaf_delay_ms: default_leaf_delay_ms(),
        }
    }
}

fn default_first_pass_timeout_ms() -> u64 {
    15_000
}
fn default_retry_timeout_ms() -> u64 {
    30_000
}
fn default_leaf_delay_ms() -> u64 {
    300
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Run Chrome without a window.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Upper bound on a page navigation, in ms.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_ms: default_navigation_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_navigation_timeout_ms() -> u64 {
    60_000
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime tree-builder configuration.
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub max_concurrent_expansions: usize,
    pub max_rounds: u32,
    pub max_depth: usize,
    pub expand_poll_attempts: u32,
    pub expand_poll_interval: Duration,
    pub settle_timeout: Duration,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for TreeConfig {
    fn from(config: &AppConfig) -> Self {
        let crawl = &config.crawl;
        Self {
            max_concurrent_expansions: crawl.max_concurrent_expansions.max(1),
            max_rounds: crawl.max_rounds,
            max_depth: crawl.max_depth,
            expand_poll_attempts: crawl.expand_poll_attempts,
            expand_poll_interval: Duration::from_millis(crawl.expand_poll_interval_ms),
            settle_timeout: Duration::from_millis(crawl.settle_timeout_ms),
        }
    }
}

/// Runtime leaf-extractor configuration.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub first_pass_timeout: Duration,
    pub retry_timeout: Duration,
    pub leaf_delay: Duration,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ExtractConfig {
    fn from(config: &AppConfig) -> Self {
        let extract = &config.extract;
        Self {
            first_pass_timeout: Duration::from_millis(extract.first_pass_timeout_ms),
            retry_timeout: Duration::from_millis(extract.retry_timeout_ms),
            leaf_delay: Duration::from_millis(extract.leaf_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tocscraper/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ScraperError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tocscraper/tocscraper.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScraperError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| ScraperError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject values that would make the crawler spin or never wait.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.crawl.max_rounds == 0 {
        return Err(ScraperError::config("crawl.max_rounds must be at least 1"));
    }
    if config.crawl.max_concurrent_expansions == 0 {
        return Err(ScraperError::config(
            "crawl.max_concurrent_expansions must be at least 1",
        ));
    }
    if config.crawl.expand_poll_attempts == 0 {
        return Err(ScraperError::config("crawl.expand_poll_attempts must be at least 1"));
    }
    if config.extract.first_pass_timeout_ms == 0 || config.extract.retry_timeout_ms == 0 {
        return Err(ScraperError::config("extract timeouts must be non-zero"));
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScraperError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ScraperError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScraperError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("max_concurrent_expansions"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.crawl.max_depth, 20);
        assert_eq!(parsed.extract.first_pass_timeout_ms, 15_000);
        assert!(parsed.browser.headless);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[crawl]
max_concurrent_expansions = 4

[extract]
leaf_delay_ms = 0
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.crawl.max_concurrent_expansions, 4);
        assert_eq!(config.crawl.max_rounds, 50);
        assert_eq!(config.extract.leaf_delay_ms, 0);
        assert_eq!(config.extract.retry_timeout_ms, 30_000);
        assert_eq!(config.defaults.output_dir, "output");
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let mut app = AppConfig::default();
        app.crawl.max_concurrent_expansions = 0;
        let tree = TreeConfig::from(&app);
        assert_eq!(tree.max_concurrent_expansions, 1);
        assert_eq!(tree.expand_poll_interval, Duration::from_millis(500));

        let extract = ExtractConfig::from(&app);
        assert_eq!(extract.first_pass_timeout, Duration::from_secs(15));
        assert_eq!(extract.retry_timeout, Duration::from_secs(30));
        assert_eq!(extract.leaf_delay, Duration::from_millis(300));
    }

    #[test]
    fn validation_rejects_zero_rounds() {
        let mut config = AppConfig::default();
        config.crawl.max_rounds = 0;
        assert!(validate_config(&config).is_err());
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn validation_rejects_zero_concurrency_and_poll_attempts() {
        let mut config = AppConfig::default();
        config.crawl.max_concurrent_expansions = 0;
        let err = validate_config(&config).expect_err("zero concurrency");
        assert!(err.to_string().contains("max_concurrent_expansions"));

        let mut config = AppConfig::default();
        config.crawl.expand_poll_attempts = 0;
        let err = validate_config(&config).expect_err("zero poll attempts");
        assert!(err.to_string().contains("expand_poll_attempts"));
    }

    #[test]
    fn zero_concurrency_in_file_is_rejected() {
        let dir = std::env::temp_dir().join(format!("tocscraper-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("zero.toml");
        std::fs::write(&path, "[crawl]\nmax_concurrent_expansions = 0\n").unwrap();

        assert!(load_config_from(&path).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
