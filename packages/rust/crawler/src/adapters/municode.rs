//! Municode Library and EnCodePlus.
//!
//! Children are fetched per node when its chevron is clicked, and the sidebar
//! re-renders while loading, so this platform is walked node by node.

use tocscraper_shared::Platform;

use super::profile::{ContentUrl, Fallback, PlatformProfile};
use super::ExpansionStrategy;

pub(crate) static PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::Municode,
    strategy: ExpansionStrategy::DepthFirst,
    root: "#genToc",
    node: "li.toc-item",
    key_attr: "data-node-id",
    title: ".toc-item-heading",
    link: "a.toc-item-heading",
    toggle: "button.toc-item-expand",
    expanded: ".toc-item--expanded",
    leaf: ".toc-item--document",
    loading: "#genToc .loading-indicator",
    content: "#codesContent .chunk[data-node-id=\"{key}\"]",
    content_url: ContentUrl::Query("nodeId"),
    fallback: Fallback::Navigate,
};
