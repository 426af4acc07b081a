//! Tree adapter contract and the built-in platform adapters.
//!
//! A [`TreeAdapter`] knows how one publishing platform lays out its lazily
//! loaded table of contents. The tree builder, leaf extractor and flattener
//! only ever talk to this trait, so a new platform is added by writing a new
//! adapter (or a new [`PlatformProfile`]) without touching them.

mod amlegal;
mod general_code;
mod municipal_code_online;
mod municode;
mod profile;
mod scripted;

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use tocscraper_shared::{Platform, Result};

pub use profile::{ContentUrl, Fallback, PlatformProfile};
pub use scripted::ScriptedAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// How the tree builder discovers the hierarchy for a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionStrategy {
    /// Bulk-expand every collapsed node in rounds until none remain, then walk.
    Fixpoint,
    /// Expand node by node while walking, polling for children after each.
    DepthFirst,
}

/// Adapter-reported metadata for one node, as currently visible on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub title: String,
    /// The platform marks this node as a document (no children to expand).
    #[serde(default)]
    pub is_leaf_hint: bool,
    #[serde(default)]
    pub is_expanded: bool,
    #[serde(default)]
    pub has_children_in_dom: bool,
    #[serde(default)]
    pub href: Option<String>,
}

/// Platform-specific knowledge of a lazily loaded navigation tree.
///
/// Node keys are the platform's stable identifiers (docId, nodeId, ...).
/// Implementations must be self-contained: no method may rely on helpers
/// injected into the page by another call.
pub trait TreeAdapter: Send + Sync + 'static {
    /// Human-readable adapter name for tracing and output metadata.
    fn name(&self) -> &str;

    /// Which discovery strategy suits this platform.
    fn strategy(&self) -> ExpansionStrategy;

    /// Keys of the top-level TOC entries. Fails with
    /// [`RootNotFound`](tocscraper_shared::ScraperError::RootNotFound) when
    /// the TOC container itself is missing.
    fn root_keys(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Keys of every node that is currently collapsed but expandable.
    fn collapsed_keys(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn node_info(&self, key: &str) -> impl Future<Output = Result<NodeInfo>> + Send;

    /// Trigger expansion. A no-op for nodes that are already expanded.
    fn expand(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Ordered keys of the node's children currently present on the page.
    fn child_keys(&self, key: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Block until no loading indicators remain, or `timeout` elapses.
    fn wait_until_settled(&self, timeout: Duration) -> impl Future<Output = Result<()>> + Send;

    /// Whether the leaf's content region is already on the page.
    fn content_present(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// First-pass activation (usually a click on the leaf's link).
    fn activate(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Retry-pass activation using a different trigger than [`activate`](Self::activate).
    fn activate_fallback(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the leaf's content region to appear.
    fn wait_for_content(
        &self,
        key: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The leaf's content block, or `None` if the region is absent.
    fn extract_leaf_content(&self, key: &str)
    -> impl Future<Output = Result<Option<String>>> + Send;

    /// Absolute URL for the node's content, if the platform has one.
    fn build_content_url(&self, key: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The built-in profile for `platform`.
pub fn profile_for(platform: Platform) -> &'static PlatformProfile {
    match platform {
        Platform::AmLegal => &amlegal::PROFILE,
        Platform::Municode => &municode::PROFILE,
        Platform::GeneralCodeSubdomain => &general_code::SUBDOMAIN_PROFILE,
        Platform::GeneralCodePublish => &general_code::PUBLISH_PROFILE,
        Platform::MunicipalCodeOnline => &municipal_code_online::PROFILE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_platform_has_its_own_profile() {
        for platform in Platform::ALL {
            let profile = profile_for(platform);
            assert_eq!(profile.platform, platform);
            assert!(profile.content.contains("{key}"), "{platform} content template");
            assert!(!profile.key_attr.is_empty());
        }
    }

    #[test]
    fn node_info_deserializes_camel_case() {
        let info: NodeInfo = serde_json::from_str(
            r#"{"title":"Chapter 1","isLeafHint":false,"isExpanded":true,"hasChildrenInDom":true,"href":null}"#,
        )
        .expect("deserialize");
        assert_eq!(info.title, "Chapter 1");
        assert!(info.is_expanded);
        assert!(info.has_children_in_dom);
        assert!(info.href.is_none());
    }
}
