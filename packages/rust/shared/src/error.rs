//! Error types for tocscraper.
//!
//! Library crates use [`ScraperError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Node- and leaf-level variants are recorded inline by the crawler and never
//! abort a source; only [`ScraperError::is_structural`] errors do.

use std::path::PathBuf;

/// Top-level error type for all tocscraper operations.
#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The page controller failed (navigation, script evaluation, click).
    #[error("page error: {0}")]
    Page(String),

    /// A bounded wait elapsed without its condition becoming true.
    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    /// The TOC container itself is missing; fatal for the source.
    #[error("TOC root not found: {message}")]
    RootNotFound { message: String },

    /// A single node's metadata could not be read.
    #[error("failed to read node {key}: {message}")]
    NodeRead { key: String, message: String },

    /// Expansion was triggered but no children appeared within the allowed polls.
    #[error("node {key} showed no children after {attempts} polls")]
    ExpansionTimeout { key: String, attempts: u32 },

    /// First-pass leaf extraction failure; queued for retry.
    #[error("leaf {key} extraction failed: {message}")]
    LeafExtraction { key: String, message: String },

    /// Retry-pass leaf extraction failure; terminal.
    #[error("leaf {key} extraction failed after retry: {message}")]
    LeafExtractionRetry { key: String, message: String },

    /// CSV parsing error for batch input.
    #[error("CSV error: {0}")]
    Csv(String),

    /// JSON (de)serialization error for output or checkpoint files.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Data validation error (bad URL, unknown platform, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScraperError>;

impl ScraperError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a page-controller error from any displayable message.
    pub fn page(msg: impl Into<String>) -> Self {
        Self::Page(msg.into())
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a root-not-found error.
    pub fn root_not_found(msg: impl Into<String>) -> Self {
        Self::RootNotFound {
            message: msg.into(),
        }
    }

    /// Create a node-read error for `key`.
    pub fn node_read(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::NodeRead {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error for a wait that ran for `waited`.
    pub fn timeout(what: impl Into<String>, waited: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the whole source rather than a single node or leaf.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::RootNotFound { .. })
    }

    /// Whether this error came from a bounded wait elapsing.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ExpansionTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for ScraperError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ScraperError::config("max_depth must be positive");
        assert_eq!(err.to_string(), "config error: max_depth must be positive");

        let err = ScraperError::timeout(
            "content of leaf 12",
            std::time::Duration::from_millis(15_000),
        );
        assert_eq!(
            err.to_string(),
            "timed out after 15000ms waiting for content of leaf 12"
        );
    }

    #[test]
    fn only_root_not_found_is_structural() {
        assert!(ScraperError::root_not_found("#toc missing").is_structural());
        assert!(!ScraperError::node_read("k1", "detached").is_structural());
        assert!(
            !ScraperError::LeafExtractionRetry {
                key: "k1".into(),
                message: "empty".into(),
            }
            .is_structural()
        );
    }

    #[test]
    fn timeout_classification() {
        assert!(
            ScraperError::ExpansionTimeout {
                key: "k".into(),
                attempts: 5
            }
            .is_timeout()
        );
        assert!(!ScraperError::page("click failed").is_timeout());
    }
}
