//! American Legal Publishing (codelibrary.amlegal.com).
//!
//! The code navigator renders every level of the TOC in one sidebar and loads
//! children on expand. Activating a leaf can render several sibling sections
//! into the reader at once, so content presence is checked before clicking.

use tocscraper_shared::Platform;

use super::profile::{ContentUrl, Fallback, PlatformProfile};
use super::ExpansionStrategy;

pub(crate) static PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::AmLegal,
    strategy: ExpansionStrategy::Fixpoint,
    root: ".codenav__toc",
    node: "li.toc-entry",
    key_attr: "data-doc-id",
    title: ".toc-entry__title",
    link: "a.toc-entry__link",
    toggle: "button.toc-entry__toggle",
    expanded: ".toc-entry--open",
    leaf: ".toc-entry--document",
    loading: ".codenav__toc .toc-entry__spinner",
    content: "#codecontent .rbox[data-doc-id=\"{key}\"]",
    content_url: ContentUrl::Query("doc"),
    fallback: Fallback::Navigate,
};
