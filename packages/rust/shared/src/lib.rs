//! Shared types, error model, and configuration for tocscraper.
//!
//! This crate is the foundation depended on by all other tocscraper crates.
//! It provides:
//! - [`ScraperError`]: the unified error type
//! - Domain types ([`TocNode`], [`FlatSection`], [`ScrapeOutput`], [`Jurisdiction`], [`Platform`])
//! - Configuration ([`AppConfig`], [`TreeConfig`], [`ExtractConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserSettings, CrawlSettings, DefaultsConfig, ExtractConfig, ExtractSettings,
    TreeConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_config,
};
pub use error::{Result, ScraperError};
pub use types::{
    FlatSection, Jurisdiction, OutputMetadata, Platform, ScrapeOutput, ScrapeStats, TocNode,
    output_slug,
};
