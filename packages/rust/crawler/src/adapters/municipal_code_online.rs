//! MunicipalCodeOnline.
//!
//! The TOC is a jsTree with lazily loaded branches. Leaf content is routed by
//! the URL hash, which is also the retry trigger.

use tocscraper_shared::Platform;

use super::profile::{ContentUrl, Fallback, PlatformProfile};
use super::ExpansionStrategy;

pub(crate) static PROFILE: PlatformProfile = PlatformProfile {
    platform: Platform::MunicipalCodeOnline,
    strategy: ExpansionStrategy::DepthFirst,
    root: "#tocTree",
    node: "li.jstree-node",
    key_attr: "id",
    title: "a.jstree-anchor",
    link: "a.jstree-anchor",
    toggle: "i.jstree-ocl",
    expanded: ".jstree-open",
    leaf: ".jstree-leaf",
    loading: "#tocTree .jstree-loading",
    content: "#ordinanceContent [data-secid=\"{key}\"]",
    content_url: ContentUrl::Fragment,
    fallback: Fallback::Hash,
};
