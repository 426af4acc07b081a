//! General Code (eCode360 subdomains and the publish viewer).
//!
//! Both products expand by bulk rounds. The subdomain site addresses each
//! section by a numeric identifier in the path; the publish viewer is a
//! hash-routed SPA whose links only respond to script-dispatched clicks once
//! the first click has been swallowed by its router.

use tocscraper_shared::Platform;

use super::profile::{ContentUrl, Fallback, PlatformProfile};
use super::ExpansionStrategy;

pub(crate) static SUBDOMAIN_PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::GeneralCodeSubdomain,
    strategy: ExpansionStrategy::Fixpoint,
    root: "#tocContainer",
    node: "div.tocItem",
    key_attr: "data-guid",
    title: ".titleLink",
    link: "a.titleLink",
    toggle: ".expander",
    expanded: ".tocItem.open",
    leaf: ".tocItem.section",
    loading: "#tocContainer .loading",
    content: "#mainContent .section_content[data-guid=\"{key}\"]",
    content_url: ContentUrl::PathSegment,
    fallback: Fallback::Navigate,
};

pub(crate) static PUBLISH_PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::GeneralCodePublish,
    strategy: ExpansionStrategy::Fixpoint,
    root: "#publishToc",
    node: "li.pub-toc-node",
    key_attr: "data-identifier",
    title: ".pub-toc-label",
    link: "a.pub-toc-label",
    toggle: ".pub-toc-caret",
    expanded: ".pub-toc-node.is-expanded",
    leaf: ".pub-toc-node.is-leaf",
    loading: "#publishToc .pub-toc-loading",
    content: "#publishContent section[data-identifier=\"{key}\"]",
    content_url: ContentUrl::Fragment,
    fallback: Fallback::DispatchClick,
};
