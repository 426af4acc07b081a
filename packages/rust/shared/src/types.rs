//! Core domain types: the discovered TOC tree, its flattened output form,
//! the output artifact, and batch input rows.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ScraperError;

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The legal-code publishing platforms with a built-in adapter profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    AmLegal,
    Municode,
    GeneralCodeSubdomain,
    GeneralCodePublish,
    MunicipalCodeOnline,
}

impl Platform {
    /// Every supported platform, in a stable order.
    pub const ALL: [Platform; 5] = [
        Platform::AmLegal,
        Platform::Municode,
        Platform::GeneralCodeSubdomain,
        Platform::GeneralCodePublish,
        Platform::MunicipalCodeOnline,
    ];

    /// Stable kebab-case name, also used as the scraper name in output metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::AmLegal => "amlegal",
            Platform::Municode => "municode",
            Platform::GeneralCodeSubdomain => "general-code-subdomain",
            Platform::GeneralCodePublish => "general-code-publish",
            Platform::MunicipalCodeOnline => "municipal-code-online",
        }
    }

    /// Guess the platform from a code URL's host.
    pub fn detect(url: &Url) -> Option<Platform> {
        let host = url.host_str()?.to_ascii_lowercase();
        let on = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

        if on("amlegal.com") {
            Some(Platform::AmLegal)
        } else if on("municode.com") || on("encodeplus.com") {
            Some(Platform::Municode)
        } else if on("municipalcodeonline.com") {
            Some(Platform::MunicipalCodeOnline)
        } else if on("generalcode.com") || host == "ecode360.com" || host == "www.ecode360.com" {
            Some(Platform::GeneralCodePublish)
        } else if on("ecode360.com") {
            Some(Platform::GeneralCodeSubdomain)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match folded.as_str() {
            "amlegal" => Ok(Platform::AmLegal),
            "municode" | "encodeplus" => Ok(Platform::Municode),
            "generalcodesubdomain" | "gcsubdomain" | "ecode360" => {
                Ok(Platform::GeneralCodeSubdomain)
            }
            "generalcodepublish" | "gcpublish" | "generalcode" => Ok(Platform::GeneralCodePublish),
            "municipalcodeonline" | "mco" => Ok(Platform::MunicipalCodeOnline),
            _ => Err(ScraperError::validation(format!("unknown platform '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// TocNode
// ---------------------------------------------------------------------------

/// One entry in the discovered navigation hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocNode {
    /// Display text.
    pub title: String,
    /// Adapter-defined stable identifier (docId, secid, nodeId, ...).
    pub key: String,
    /// Resolved absolute URL, if the platform assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Ordered children; empty until expansion has been attempted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocNode>,
    /// Distinguishes "no children exist" from "children not yet discovered".
    #[serde(default)]
    pub expansion_attempted: bool,
    /// Children exist on the page but were left out of the tree (depth cap,
    /// repeated key or unreadable node). Such a node is still a branch.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub children_omitted: bool,
}

impl TocNode {
    /// A node whose expansion has not been attempted yet.
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            key: key.into(),
            url: None,
            children: Vec::new(),
            expansion_attempted: false,
            children_omitted: false,
        }
    }

    /// Whether the node is a branch on the page, whether or not its
    /// children made it into the tree.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty() || self.children_omitted
    }

    /// Leaf iff expansion was attempted and turned up no children.
    pub fn is_leaf(&self) -> bool {
        self.expansion_attempted && !self.has_children()
    }
}

// ---------------------------------------------------------------------------
// FlatSection
// ---------------------------------------------------------------------------

/// Output record, one per [`TocNode`], in preorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatSection {
    /// Adapter key; internal only, never written to the artifact.
    #[serde(skip)]
    pub key: String,
    /// The node title.
    pub value: String,
    /// Ancestor titles followed by this node's title.
    pub path: Vec<String>,
    /// `path.len() - 1`.
    pub depth: usize,
    #[serde(default)]
    pub url: Option<String>,
    pub has_children: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(
        default,
        rename = "htmlError",
        skip_serializing_if = "Option::is_none"
    )]
    pub html_error: Option<String>,
}

impl FlatSection {
    /// Whether content extraction applies to this entry.
    pub fn is_leaf(&self) -> bool {
        !self.has_children
    }

    /// Record extracted content, clearing any earlier error.
    pub fn set_html(&mut self, html: String) {
        self.html = Some(html);
        self.html_error = None;
    }

    /// Record a terminal extraction failure, clearing any content.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.html = None;
        self.html_error = Some(error.into());
    }
}

// ---------------------------------------------------------------------------
// Stats and output artifact
// ---------------------------------------------------------------------------

/// Counts reported at the end of every source crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeStats {
    /// Total flattened sections.
    pub sections: usize,
    /// Sections with `has_children == false`.
    pub leaves: usize,
    /// Leaves with `html` set (includes `reused` and `recovered_on_retry`).
    pub extracted: usize,
    /// Leaves satisfied from already-scraped keys without navigation.
    pub reused: usize,
    /// Leaves that failed the first pass and succeeded on retry.
    pub recovered_on_retry: usize,
    /// Leaves with `htmlError` set.
    pub failed: usize,
    /// Leaves with neither set.
    pub pending: usize,
}

impl ScrapeStats {
    /// Tally counts from a processed section list.
    pub fn from_sections(sections: &[FlatSection]) -> Self {
        let mut stats = Self {
            sections: sections.len(),
            ..Self::default()
        };
        for section in sections.iter().filter(|s| s.is_leaf()) {
            stats.leaves += 1;
            match (&section.html, &section.html_error) {
                (Some(_), _) => stats.extracted += 1,
                (None, Some(_)) => stats.failed += 1,
                (None, None) => stats.pending += 1,
            }
        }
        stats
    }
}

/// `metadata` block of the output artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    pub source_url: String,
    pub output_name: String,
    pub scraper_name: String,
    pub scraper_version: String,
    /// The batch CSV this source came from (batch mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_file: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub stats: ScrapeStats,
}

/// The JSON artifact written once per source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOutput {
    pub metadata: OutputMetadata,
    pub sections: Vec<FlatSection>,
}

// ---------------------------------------------------------------------------
// Jurisdiction
// ---------------------------------------------------------------------------

/// One row of the batch CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub code_url: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub status: String,
}

impl Jurisdiction {
    /// Only `ready` rows are crawled.
    pub fn is_ready(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("ready")
    }

    /// The crawl entry point: `code_url`, falling back to `base_url`.
    pub fn entry_url(&self) -> Option<&str> {
        [self.code_url.trim(), self.base_url.trim()]
            .into_iter()
            .find(|u| !u.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Output names
// ---------------------------------------------------------------------------

static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9._-]+").unwrap());

/// Reduce an output name to a filesystem-safe slug (`"City of X, CA"` → `"city-of-x-ca"`).
pub fn output_slug(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "-");
    let slug = slug.trim_matches(|c| c == '-' || c == '.');
    if slug.is_empty() {
        "output".to_string()
    } else {
        slug.to_string()
    }
}
