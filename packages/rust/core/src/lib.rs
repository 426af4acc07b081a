//! Core pipeline orchestration for tocscraper.
//!
//! This crate ties the crawler together into end-to-end workflows: flattening
//! the discovered TOC, scraping one source to a JSON artifact with
//! checkpoints, and running a CSV batch of jurisdictions.

pub mod batch;
pub mod output;
pub mod pipeline;
pub mod toc;

pub use batch::{AdapterFactory, BatchConfig, BatchReport, load_jurisdictions, run_batch};
pub use output::{Checkpoint, CheckpointEntry, output_path, write_output};
pub use pipeline::{
    ProgressReporter, ScrapeResult, ScrapeSourceConfig, SilentProgress, scrape_source,
};
pub use toc::{flatten, flatten_with_parent};
