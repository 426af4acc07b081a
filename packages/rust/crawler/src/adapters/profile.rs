//! Declarative description of one platform's TOC markup.

use url::Url;

use tocscraper_shared::Platform;

use super::ExpansionStrategy;

/// How a node key maps to a content URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentUrl {
    /// `base#key`
    Fragment,
    /// `base?param=key`, replacing any existing `param`.
    Query(&'static str),
    /// `base` joined with `key` as a relative path.
    PathSegment,
}

impl ContentUrl {
    /// Build the content URL for `key` relative to `base`.
    pub fn build(&self, base: &Url, key: &str) -> Option<Url> {
        match self {
            ContentUrl::Fragment => {
                let mut url = base.clone();
                url.set_fragment(Some(key));
                Some(url)
            }
            ContentUrl::Query(param) => {
                let mut url = base.clone();
                let kept: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(k, _)| *k != **param)
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(kept)
                    .append_pair(param, key);
                Some(url)
            }
            ContentUrl::PathSegment => base.join(key).ok(),
        }
    }
}

/// The retry-pass trigger, deliberately different from the first-pass click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Navigate the page straight to the leaf's content URL.
    Navigate,
    /// Set `location.hash` to the key and let the SPA router load it.
    Hash,
    /// Dispatch a synthetic click event on the leaf's link from script.
    DispatchClick,
}

/// Selectors and conventions for one platform.
///
/// All selectors are plain CSS. `node` must be a simple selector so that an
/// attribute filter can be appended to it. `content` contains a `{key}`
/// placeholder that is replaced with the CSS-escaped node key.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub platform: Platform,
    pub strategy: ExpansionStrategy,
    /// The TOC container.
    pub root: &'static str,
    /// One TOC entry (branch or leaf).
    pub node: &'static str,
    /// Attribute on `node` carrying the stable key.
    pub key_attr: &'static str,
    /// Title element inside a node.
    pub title: &'static str,
    /// Link inside a node that loads its content.
    pub link: &'static str,
    /// Expand/collapse toggle inside a node.
    pub toggle: &'static str,
    /// Matches a node that is currently expanded.
    pub expanded: &'static str,
    /// Matches a node that is a document rather than a folder.
    pub leaf: &'static str,
    /// Any loading indicator inside the TOC.
    pub loading: &'static str,
    /// Content region for a leaf, with a `{key}` placeholder.
    pub content: &'static str,
    pub content_url: ContentUrl,
    pub fallback: Fallback,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://library.example.com/ca/town/codes/code?nodeId=ROOT&lang=en").unwrap()
    }

    #[test]
    fn query_replaces_existing_param() {
        let url = ContentUrl::Query("nodeId").build(&base(), "CH1_S2").unwrap();
        assert_eq!(
            url.as_str(),
            "https://library.example.com/ca/town/codes/code?lang=en&nodeId=CH1_S2"
        );
    }

    #[test]
    fn fragment_and_path_segment() {
        let url = ContentUrl::Fragment.build(&base(), "sec-4").unwrap();
        assert_eq!(url.fragment(), Some("sec-4"));

        let root = Url::parse("https://town.ecode360.com/").unwrap();
        let url = ContentUrl::PathSegment.build(&root, "12345678").unwrap();
        assert_eq!(url.as_str(), "https://town.ecode360.com/12345678");
    }
}
