//! In-memory doubles for [`PageController`] and [`TreeAdapter`].
//!
//! Compiled for this crate's tests and, behind the `test-util` feature, for
//! other crates' tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use tocscraper_shared::{Result, ScraperError};

use crate::adapters::{ExpansionStrategy, NodeInfo, TreeAdapter};
use crate::page::PageController;

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

type Responder = Arc<dyn Fn(&str) -> Value + Send + Sync>;

#[derive(Default)]
struct PageLog {
    scripts: Vec<String>,
    clicks: Vec<String>,
    navigations: Vec<String>,
}

/// A [`PageController`] that answers scripts from a closure and records calls.
pub struct MockPage {
    responder: Responder,
    present: HashSet<String>,
    /// URL reported by `current_url` once the page has navigated.
    landed: Option<String>,
    log: Mutex<PageLog>,
}

impl MockPage {
    pub fn new(responder: impl Fn(&str) -> Value + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(responder),
            present: HashSet::new(),
            landed: None,
            log: Mutex::new(PageLog::default()),
        }
    }

    /// Make `wait_for_selector(selector, _)` succeed.
    pub fn with_present(mut self, selector: &str) -> Self {
        self.present.insert(selector.to_string());
        self
    }

    /// Report `url` from `current_url` after any navigation, as a server
    /// redirect would.
    pub fn redirect_to(mut self, url: &str) -> Self {
        self.landed = Some(url.to_string());
        self
    }

    pub fn scripts(&self) -> Vec<String> {
        self.log().scripts.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.log().clicks.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.log().navigations.clone()
    }

    fn log(&self) -> MutexGuard<'_, PageLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PageController for MockPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.log().navigations.push(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.log().scripts.push(script.to_string());
        Ok((self.responder)(script))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.log().clicks.push(selector.to_string());
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        if self.present.contains(selector) {
            Ok(())
        } else {
            Err(ScraperError::timeout(selector, timeout))
        }
    }

    async fn current_url(&self) -> Result<String> {
        let log = self.log();
        let Some(last) = log.navigations.last() else {
            return Ok("about:blank".to_string());
        };
        Ok(self.landed.clone().unwrap_or_else(|| last.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockSite
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct SiteNode {
    title: String,
    children: Vec<String>,
    /// Collapsed branch whose expansion never shows any children.
    empty_branch: bool,
}

#[derive(Default)]
struct SiteState {
    nodes: HashMap<String, SiteNode>,
    roots: Vec<String>,
    root_missing: bool,
    expanded: HashSet<String>,
    rendered: HashSet<String>,
    broken: HashSet<String>,
    failing_expand: HashSet<String>,
    fail_first_pass: HashSet<String>,
    fail_always: HashSet<String>,
    renders_together: HashMap<String, Vec<String>>,
    activations: Vec<String>,
    fallbacks: Vec<String>,
    expansions: Vec<String>,
    settles: usize,
}

/// A lazily loaded TOC held in memory, implementing [`TreeAdapter`].
///
/// Children of a node are only reported once the node has been expanded.
/// Leaf content appears once the leaf has been activated, unless the leaf is
/// configured to fail.
pub struct MockSite {
    strategy: ExpansionStrategy,
    state: Mutex<SiteState>,
}

impl MockSite {
    pub fn new(strategy: ExpansionStrategy) -> Self {
        Self {
            strategy,
            state: Mutex::new(SiteState::default()),
        }
    }

    /// A branch node with ordered children.
    pub fn branch(self, key: &str, title: &str, children: &[&str]) -> Self {
        self.with(|s| {
            s.nodes.insert(
                key.to_string(),
                SiteNode {
                    title: title.to_string(),
                    children: children.iter().map(|c| c.to_string()).collect(),
                    empty_branch: false,
                },
            );
        })
    }

    pub fn leaf(self, key: &str, title: &str) -> Self {
        self.branch(key, title, &[])
    }

    /// A node that looks expandable but never shows children.
    pub fn empty_branch(self, key: &str, title: &str) -> Self {
        self.branch(key, title, &[]).with(|s| {
            if let Some(node) = s.nodes.get_mut(key) {
                node.empty_branch = true;
            }
        })
    }

    pub fn roots(self, keys: &[&str]) -> Self {
        self.with(|s| s.roots = keys.iter().map(|k| k.to_string()).collect())
    }

    /// The TOC container is absent.
    pub fn root_missing(self) -> Self {
        self.with(|s| s.root_missing = true)
    }

    /// `node_info` fails for `key`.
    pub fn broken(self, key: &str) -> Self {
        self.with(|s| {
            s.broken.insert(key.to_string());
        })
    }

    /// `expand` fails for `key`.
    pub fn failing_expand(self, key: &str) -> Self {
        self.with(|s| {
            s.failing_expand.insert(key.to_string());
        })
    }

    /// The first-pass click never renders content for `key`; the fallback does.
    pub fn fail_first_pass(self, key: &str) -> Self {
        self.with(|s| {
            s.fail_first_pass.insert(key.to_string());
        })
    }

    /// Neither trigger ever renders content for `key`.
    pub fn fail_always(self, key: &str) -> Self {
        self.with(|s| {
            s.fail_always.insert(key.to_string());
        })
    }

    /// Activating `key` renders content for every key in `group`.
    pub fn renders_together(self, key: &str, group: &[&str]) -> Self {
        self.with(|s| {
            s.renders_together
                .insert(key.to_string(), group.iter().map(|g| g.to_string()).collect());
        })
    }

    /// Content for `key` is on the page before any activation.
    pub fn prerendered(self, key: &str) -> Self {
        self.with(|s| {
            s.rendered.insert(key.to_string());
        })
    }

    /// Keys passed to `activate`, in call order.
    pub fn activations(&self) -> Vec<String> {
        self.state().activations.clone()
    }

    /// Keys passed to `activate_fallback`, in call order.
    pub fn fallbacks(&self) -> Vec<String> {
        self.state().fallbacks.clone()
    }

    /// Keys passed to `expand`, in call order.
    pub fn expansions(&self) -> Vec<String> {
        self.state().expansions.clone()
    }

    pub fn settles(&self) -> usize {
        self.state().settles
    }

    fn with(self, f: impl FnOnce(&mut SiteState)) -> Self {
        f(&mut self.state());
        self
    }

    fn state(&self) -> MutexGuard<'_, SiteState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn node(state: &SiteState, key: &str) -> Result<SiteNode> {
        state
            .nodes
            .get(key)
            .cloned()
            .ok_or_else(|| ScraperError::node_read(key, "unknown node"))
    }

    fn is_branch(node: &SiteNode) -> bool {
        node.empty_branch || !node.children.is_empty()
    }
}

impl TreeAdapter for MockSite {
    fn name(&self) -> &str {
        "mock"
    }

    fn strategy(&self) -> ExpansionStrategy {
        self.strategy
    }

    async fn root_keys(&self) -> Result<Vec<String>> {
        let state = self.state();
        if state.root_missing {
            return Err(ScraperError::root_not_found("mock TOC container missing"));
        }
        Ok(state.roots.clone())
    }

    async fn collapsed_keys(&self) -> Result<Vec<String>> {
        let state = self.state();
        let mut visible: Vec<String> = Vec::new();
        let mut stack: Vec<String> = state.roots.iter().rev().cloned().collect();
        let mut seen = HashSet::new();
        while let Some(key) = stack.pop() {
            if !seen.insert(key.clone()) {
                continue;
            }
            let Some(node) = state.nodes.get(&key) else {
                continue;
            };
            if state.expanded.contains(&key) {
                stack.extend(node.children.iter().rev().cloned());
            } else if Self::is_branch(node) {
                visible.push(key);
            }
        }
        Ok(visible)
    }

    async fn node_info(&self, key: &str) -> Result<NodeInfo> {
        let state = self.state();
        if state.broken.contains(key) {
            return Err(ScraperError::node_read(key, "stale element"));
        }
        let node = Self::node(&state, key)?;
        let expanded = state.expanded.contains(key);
        Ok(NodeInfo {
            title: node.title.clone(),
            is_leaf_hint: !Self::is_branch(&node),
            is_expanded: expanded,
            has_children_in_dom: expanded && !node.children.is_empty(),
            href: Some(format!("https://code.example.test/{key}")),
        })
    }

    async fn expand(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        state.expansions.push(key.to_string());
        if state.failing_expand.contains(key) {
            return Err(ScraperError::page(format!("toggle for {key} is detached")));
        }
        state.expanded.insert(key.to_string());
        Ok(())
    }

    async fn child_keys(&self, key: &str) -> Result<Vec<String>> {
        let state = self.state();
        let node = Self::node(&state, key)?;
        if state.expanded.contains(key) {
            Ok(node.children)
        } else {
            Ok(Vec::new())
        }
    }

    async fn wait_until_settled(&self, _timeout: Duration) -> Result<()> {
        self.state().settles += 1;
        Ok(())
    }

    async fn content_present(&self, key: &str) -> Result<bool> {
        Ok(self.state().rendered.contains(key))
    }

    async fn activate(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        state.activations.push(key.to_string());
        if state.fail_first_pass.contains(key) || state.fail_always.contains(key) {
            return Ok(());
        }
        let group = state
            .renders_together
            .get(key)
            .cloned()
            .unwrap_or_else(|| vec![key.to_string()]);
        state.rendered.extend(group);
        Ok(())
    }

    async fn activate_fallback(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        state.fallbacks.push(key.to_string());
        if !state.fail_always.contains(key) {
            state.rendered.insert(key.to_string());
        }
        Ok(())
    }

    async fn wait_for_content(&self, key: &str, timeout: Duration) -> Result<()> {
        if self.state().rendered.contains(key) {
            Ok(())
        } else {
            Err(ScraperError::timeout(format!("content of {key}"), timeout))
        }
    }

    async fn extract_leaf_content(&self, key: &str) -> Result<Option<String>> {
        let state = self.state();
        if !state.rendered.contains(key) {
            return Ok(None);
        }
        let title = state
            .nodes
            .get(key)
            .map(|n| n.title.clone())
            .unwrap_or_default();
        Ok(Some(format!("<p>{title}</p>")))
    }

    fn build_content_url(&self, key: &str) -> Option<String> {
        Some(format!("https://code.example.test/{key}"))
    }
}
