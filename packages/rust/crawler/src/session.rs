//! Per-source scraping state.

use std::collections::HashMap;

use url::Url;
use uuid::Uuid;

use tocscraper_shared::{FlatSection, TocNode};

/// Everything accumulated while crawling one source URL.
///
/// `scraped` maps node keys to the cleaned content already captured in this
/// session. A key is recorded at most once; revisiting it (the same document
/// reachable from two TOC entries, or a group of leaves rendered by a single
/// click) reuses the stored content without touching the page.
#[derive(Debug, Clone)]
pub struct ScrapeSession {
    id: Uuid,
    source_url: Url,
    forest: Vec<TocNode>,
    sections: Vec<FlatSection>,
    scraped: HashMap<String, String>,
}

impl ScrapeSession {
    pub fn new(source_url: Url) -> Self {
        Self {
            id: Uuid::now_v7(),
            source_url,
            forest: Vec::new(),
            sections: Vec::new(),
            scraped: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    /// Install the discovered forest and its flattened sections.
    pub fn set_tree(&mut self, forest: Vec<TocNode>, sections: Vec<FlatSection>) {
        self.forest = forest;
        self.sections = sections;
    }

    pub fn forest(&self) -> &[TocNode] {
        &self.forest
    }

    pub fn sections(&self) -> &[FlatSection] {
        &self.sections
    }

    pub fn sections_mut(&mut self) -> &mut [FlatSection] {
        &mut self.sections
    }

    /// Content already captured for `key`, if any.
    pub fn scraped(&self, key: &str) -> Option<&str> {
        self.scraped.get(key).map(String::as_str)
    }

    pub fn is_scraped(&self, key: &str) -> bool {
        self.scraped.contains_key(key)
    }

    /// Record content for `key`. The first recording wins.
    pub fn record(&mut self, key: &str, html: &str) {
        self.scraped
            .entry(key.to_string())
            .or_insert_with(|| html.to_string());
    }

    /// Pre-populate scraped keys, e.g. from a checkpoint.
    pub fn seed(&mut self, entries: impl IntoIterator<Item = (String, String)>) {
        for (key, html) in entries {
            self.scraped.entry(key).or_insert(html);
        }
    }

    pub fn scraped_len(&self) -> usize {
        self.scraped.len()
    }

    /// Scraped entries sorted by key.
    pub fn scraped_entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .scraped
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn into_sections(self) -> Vec<FlatSection> {
        self.sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ScrapeSession {
        ScrapeSession::new(Url::parse("https://codelibrary.amlegal.com/codes/town").unwrap())
    }

    #[test]
    fn first_recording_wins() {
        let mut s = session();
        s.record("D1", "<p>first</p>");
        s.record("D1", "<p>second</p>");
        assert_eq!(s.scraped("D1"), Some("<p>first</p>"));
        assert_eq!(s.scraped_len(), 1);
    }

    #[test]
    fn seeding_does_not_overwrite() {
        let mut s = session();
        s.record("D1", "<p>live</p>");
        s.seed([
            ("D1".to_string(), "<p>stale</p>".to_string()),
            ("D2".to_string(), "<p>saved</p>".to_string()),
        ]);
        assert_eq!(s.scraped("D1"), Some("<p>live</p>"));
        assert!(s.is_scraped("D2"));
        let keys: Vec<String> = s.scraped_entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["D1", "D2"]);
    }

    #[test]
    fn set_tree_replaces_forest_and_sections() {
        let mut s = session();
        let mut root = TocNode::new("T1", "Title 1");
        root.children.push(TocNode::new("C1", "Chapter 1"));
        let section = FlatSection {
            key: "T1".to_string(),
            value: "Title 1".to_string(),
            path: vec!["Title 1".to_string()],
            depth: 0,
            url: None,
            has_children: true,
            html: None,
            html_error: None,
        };
        s.set_tree(vec![root], vec![section]);

        assert_eq!(s.forest().len(), 1);
        assert_eq!(s.forest()[0].children[0].key, "C1");
        assert_eq!(s.sections()[0].key, "T1");
    }
}
