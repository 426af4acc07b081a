//! Lazily loaded TOC crawling and leaf content extraction.
//!
//! This crate provides:
//! - [`page`]: the [`PageController`] capability the crawler consumes
//! - [`adapters`]: the [`TreeAdapter`] contract, platform profiles and [`ScriptedAdapter`]
//! - [`tree`]: [`TreeBuilder`], fixpoint and depth-first discovery
//! - [`extract`]: [`LeafExtractor`], two-phase extract-then-retry
//! - [`session`]: [`ScrapeSession`], per-source state and scraped keys

pub mod adapters;
pub mod extract;
pub mod page;
pub mod session;
pub mod tree;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use adapters::{
    ContentUrl, ExpansionStrategy, Fallback, NodeInfo, PlatformProfile, ScriptedAdapter,
    TreeAdapter, profile_for,
};
pub use extract::{
    ExtractObserver, ExtractPhase, ExtractReport, LeafExtractor, LeafProgress, NoopObserver,
    clean_content,
};
pub use page::PageController;
pub use session::ScrapeSession;
pub use tree::{TreeBuilder, TreeReport};
