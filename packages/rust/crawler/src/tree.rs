//! Navigation tree builder.
//!
//! Discovers the full TOC forest behind a [`TreeAdapter`], expanding lazily
//! loaded branches either in bulk rounds until a fixpoint is reached, or node
//! by node during a bounded depth-first walk.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use tocscraper_shared::{Result, ScraperError, TocNode, TreeConfig};

use crate::adapters::{ExpansionStrategy, NodeInfo, TreeAdapter};

/// Keys whose expansion failed this many times are left collapsed.
const MAX_EXPAND_FAILURES: u32 = 2;

// ---------------------------------------------------------------------------
// TreeReport
// ---------------------------------------------------------------------------

/// Summary of one tree discovery.
#[derive(Debug, Clone, Default)]
pub struct TreeReport {
    /// Nodes in the returned forest.
    pub nodes: usize,
    /// Fixpoint rounds that expanded at least one node.
    pub rounds: u32,
    pub fixpoint_reached: bool,
    /// Successful expand triggers.
    pub expansions: usize,
    /// Nodes skipped for exceeding the depth cap.
    pub depth_capped: usize,
    /// Nodes skipped because their key was already in the tree.
    pub duplicates: usize,
    /// Non-fatal node-level failures, in the order they happened.
    pub warnings: Vec<String>,
}

impl TreeReport {
    fn record(&mut self, error: ScraperError) {
        warn!(error = %error, "node-level failure");
        self.warnings.push(error.to_string());
    }
}

// ---------------------------------------------------------------------------
// TreeBuilder
// ---------------------------------------------------------------------------

/// Work item of the depth-first walk.
struct Frame {
    key: String,
    depth: usize,
    parent: Option<usize>,
}

/// Builds a fully expanded [`TocNode`] forest from an adapter.
pub struct TreeBuilder<A> {
    adapter: Arc<A>,
    config: TreeConfig,
}

impl<A: TreeAdapter> TreeBuilder<A> {
    pub fn new(adapter: Arc<A>, config: TreeConfig) -> Self {
        Self { adapter, config }
    }

    /// Discover the forest.
    ///
    /// Per-node failures are recorded in the report and never abort the
    /// build. A missing TOC root is returned as an error.
    #[instrument(skip_all, fields(adapter = self.adapter.name()))]
    pub async fn build(&self) -> Result<(Vec<TocNode>, TreeReport)> {
        let roots = self.adapter.root_keys().await?;
        if roots.is_empty() {
            return Err(ScraperError::root_not_found("TOC has no top-level entries"));
        }

        let mut report = TreeReport::default();
        let strategy = self.adapter.strategy();
        info!(roots = roots.len(), ?strategy, "discovering TOC");

        let forest = match strategy {
            ExpansionStrategy::Fixpoint => {
                self.expand_to_fixpoint(&mut report).await;
                self.walk(&roots, false, &mut report).await
            }
            ExpansionStrategy::DepthFirst => self.walk(&roots, true, &mut report).await,
        };

        info!(
            nodes = report.nodes,
            rounds = report.rounds,
            expansions = report.expansions,
            warnings = report.warnings.len(),
            "TOC discovered"
        );
        Ok((forest, report))
    }

    /// Expand every collapsed node in bounded concurrent batches, round after
    /// round, until none remain or `max_rounds` is hit.
    async fn expand_to_fixpoint(&self, report: &mut TreeReport) {
        let mut failures: HashMap<String, u32> = HashMap::new();
        let batch_size = self.config.max_concurrent_expansions.max(1);

        for round in 1..=self.config.max_rounds {
            let collapsed = match self.adapter.collapsed_keys().await {
                Ok(keys) => keys,
                Err(e) => {
                    report.record(e);
                    return;
                }
            };
            let pending: Vec<String> = collapsed
                .into_iter()
                .filter(|k| failures.get(k).copied().unwrap_or(0) < MAX_EXPAND_FAILURES)
                .collect();

            if pending.is_empty() {
                debug!(round, "fixpoint reached");
                report.fixpoint_reached = true;
                return;
            }

            report.rounds = round;
            debug!(round, pending = pending.len(), "expansion round");

            for batch in pending.chunks(batch_size) {
                let mut tasks = JoinSet::new();
                for key in batch {
                    let adapter = Arc::clone(&self.adapter);
                    let key = key.clone();
                    tasks.spawn(async move {
                        let result = adapter.expand(&key).await;
                        (key, result)
                    });
                }

                while let Some(joined) = tasks.join_next().await {
                    match joined {
                        Ok((_, Ok(()))) => report.expansions += 1,
                        Ok((key, Err(e))) => {
                            *failures.entry(key).or_default() += 1;
                            report.record(e);
                        }
                        Err(e) => report.record(ScraperError::page(format!(
                            "expansion task failed: {e}"
                        ))),
                    }
                }

                if let Err(e) = self
                    .adapter
                    .wait_until_settled(self.config.settle_timeout)
                    .await
                {
                    report.record(e);
                }
            }
        }

        warn!(
            max_rounds = self.config.max_rounds,
            "expansion stopped before reaching a fixpoint"
        );
    }

    /// Preorder walk over an explicit stack, assembling the forest in an arena.
    async fn walk(&self, roots: &[String], expand: bool, report: &mut TreeReport) -> Vec<TocNode> {
        let mut stack: Vec<Frame> = roots
            .iter()
            .rev()
            .map(|key| Frame {
                key: key.clone(),
                depth: 0,
                parent: None,
            })
            .collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut nodes: Vec<TocNode> = Vec::new();
        let mut parents: Vec<Option<usize>> = Vec::new();

        while let Some(frame) = stack.pop() {
            if frame.depth > self.config.max_depth {
                warn!(
                    key = %frame.key,
                    depth = frame.depth,
                    max_depth = self.config.max_depth,
                    "depth cap exceeded, not descending"
                );
                report.depth_capped += 1;
                mark_omitted(&mut nodes, frame.parent);
                continue;
            }
            if !seen.insert(frame.key.clone()) {
                warn!(key = %frame.key, "key already in tree, skipping");
                report.duplicates += 1;
                mark_omitted(&mut nodes, frame.parent);
                continue;
            }

            let info = match self.adapter.node_info(&frame.key).await {
                Ok(info) => info,
                Err(e) => {
                    report.record(e);
                    mark_omitted(&mut nodes, frame.parent);
                    continue;
                }
            };

            let children = self.discover_children(&frame.key, &info, expand, report).await;

            let title = if info.title.is_empty() {
                frame.key.clone()
            } else {
                info.title
            };
            let mut node = TocNode::new(frame.key.clone(), title);
            node.url = info
                .href
                .or_else(|| self.adapter.build_content_url(&frame.key));
            node.expansion_attempted = true;

            let index = nodes.len();
            nodes.push(node);
            parents.push(frame.parent);

            stack.extend(children.into_iter().rev().map(|key| Frame {
                key,
                depth: frame.depth + 1,
                parent: Some(index),
            }));
        }

        report.nodes = nodes.len();
        assemble(nodes, parents)
    }

    /// Child keys of one node, expanding it first when `expand` is set.
    async fn discover_children(
        &self,
        key: &str,
        info: &NodeInfo,
        expand: bool,
        report: &mut TreeReport,
    ) -> Vec<String> {
        if info.is_leaf_hint {
            return Vec::new();
        }
        if !expand || info.is_expanded {
            return self.read_children(key, report).await;
        }

        if let Err(e) = self.adapter.expand(key).await {
            report.record(e);
            return self.read_children(key, report).await;
        }
        report.expansions += 1;

        let attempts = self.config.expand_poll_attempts.max(1);
        for attempt in 1..=attempts {
            match self.adapter.child_keys(key).await {
                Ok(keys) if !keys.is_empty() => return keys,
                Ok(_) => {}
                Err(e) => {
                    report.record(e);
                    return Vec::new();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.expand_poll_interval).await;
            }
        }

        report.record(ScraperError::ExpansionTimeout {
            key: key.to_string(),
            attempts,
        });
        Vec::new()
    }

    async fn read_children(&self, key: &str, report: &mut TreeReport) -> Vec<String> {
        match self.adapter.child_keys(key).await {
            Ok(keys) => keys,
            Err(e) => {
                report.record(e);
                Vec::new()
            }
        }
    }
}

fn mark_omitted(nodes: &mut [TocNode], parent: Option<usize>) {
    if let Some(node) = parent.and_then(|index| nodes.get_mut(index)) {
        node.children_omitted = true;
    }
}

/// Attach arena nodes to their parents. Children always sit at higher
/// indices than their parent, so one reverse sweep completes every subtree
/// before its parent is moved.
fn assemble(nodes: Vec<TocNode>, parents: Vec<Option<usize>>) -> Vec<TocNode> {
    let mut slots: Vec<Option<TocNode>> = nodes.into_iter().map(Some).collect();
    let mut roots = Vec::new();

    for index in (0..slots.len()).rev() {
        let Some(mut node) = slots[index].take() else {
            continue;
        };
        node.children.reverse();
        match parents[index] {
            Some(parent) => {
                if let Some(parent) = slots[parent].as_mut() {
                    parent.children.push(node);
                }
            }
            None => roots.push(node),
        }
    }

    roots.reverse();
    roots
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::MockSite;

    fn config() -> TreeConfig {
        TreeConfig {
            max_concurrent_expansions: 10,
            max_rounds: 50,
            max_depth: 20,
            expand_poll_attempts: 3,
            expand_poll_interval: Duration::from_millis(1),
            settle_timeout: Duration::from_millis(10),
        }
    }

    fn sample(strategy: ExpansionStrategy) -> MockSite {
        MockSite::new(strategy)
            .roots(&["A"])
            .branch("A", "Title 1", &["B", "C"])
            .leaf("B", "Chapter 1.01")
            .branch("C", "Chapter 1.02", &["D"])
            .leaf("D", "Section 1.02.010")
    }

    fn titles(nodes: &[TocNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.title.as_str()).collect()
    }

    async fn build(site: &Arc<MockSite>, config: TreeConfig) -> (Vec<TocNode>, TreeReport) {
        TreeBuilder::new(Arc::clone(site), config)
            .build()
            .await
            .expect("build")
    }

    #[tokio::test]
    async fn fixpoint_expands_in_rounds_then_walks() {
        let site = Arc::new(sample(ExpansionStrategy::Fixpoint));
        let (forest, report) = build(&site, config()).await;

        assert_eq!(titles(&forest), vec!["Title 1"]);
        assert_eq!(titles(&forest[0].children), vec!["Chapter 1.01", "Chapter 1.02"]);
        assert_eq!(titles(&forest[0].children[1].children), vec!["Section 1.02.010"]);
        assert!(forest[0].children[0].is_leaf());

        assert!(report.fixpoint_reached);
        assert_eq!(report.rounds, 2);
        assert_eq!(report.expansions, 2);
        assert_eq!(report.nodes, 4);
        assert_eq!(site.expansions(), vec!["A", "C"]);
        assert_eq!(site.settles(), 2);
    }

    #[tokio::test]
    async fn depth_first_expands_while_walking() {
        let site = Arc::new(sample(ExpansionStrategy::DepthFirst));
        let (forest, report) = build(&site, config()).await;

        assert_eq!(forest[0].children.len(), 2);
        assert_eq!(forest[0].children[1].children[0].key, "D");
        assert_eq!(
            forest[0].children[1].children[0].url.as_deref(),
            Some("https://code.example.test/D")
        );
        assert_eq!(site.expansions(), vec!["A", "C"]);
        assert_eq!(site.settles(), 0);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn fixpoint_batches_are_bounded() {
        let keys: Vec<String> = (0..12).map(|i| format!("T{i}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let mut site = MockSite::new(ExpansionStrategy::Fixpoint).roots(&refs);
        for key in &keys {
            let child = format!("{key}-1");
            site = site.branch(key, key, &[child.as_str()]).leaf(&child, &child);
        }
        let site = Arc::new(site);

        let mut cfg = config();
        cfg.max_concurrent_expansions = 5;
        let (forest, report) = build(&site, cfg).await;

        assert_eq!(forest.len(), 12);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.expansions, 12);
        // 12 keys in batches of 5: three settle waits.
        assert_eq!(site.settles(), 3);
        // Output order follows the TOC, not expansion completion order.
        assert_eq!(forest[11].key, "T11");
        assert_eq!(forest[11].children[0].key, "T11-1");
    }

    #[tokio::test]
    async fn failing_expansion_is_retried_once_then_left() {
        let site = Arc::new(
            sample(ExpansionStrategy::Fixpoint)
                .roots(&["A", "X"])
                .branch("X", "Title 2", &["Y"])
                .leaf("Y", "Chapter 2.01")
                .failing_expand("X"),
        );
        let (forest, report) = build(&site, config()).await;

        assert_eq!(titles(&forest), vec!["Title 1", "Title 2"]);
        assert!(forest[1].children.is_empty());
        assert!(report.fixpoint_reached);
        assert_eq!(report.warnings.len(), 2);
        let x_attempts = site.expansions().iter().filter(|k| *k == "X").count();
        assert_eq!(x_attempts, MAX_EXPAND_FAILURES as usize);
    }

    #[tokio::test]
    async fn unreadable_node_is_skipped_with_siblings_kept() {
        let site = Arc::new(
            MockSite::new(ExpansionStrategy::DepthFirst)
                .roots(&["A", "B", "C"])
                .leaf("A", "Article I")
                .branch("B", "Article II", &["B1"])
                .leaf("B1", "Section 2.1")
                .leaf("C", "Article III")
                .broken("B"),
        );
        let (forest, report) = build(&site, config()).await;

        assert_eq!(titles(&forest), vec!["Article I", "Article III"]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("failed to read node B"));
    }

    #[tokio::test]
    async fn missing_root_aborts_the_source() {
        let site = Arc::new(MockSite::new(ExpansionStrategy::Fixpoint).root_missing());
        let err = TreeBuilder::new(site, config())
            .build()
            .await
            .expect_err("no root");
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn empty_root_list_is_structural() {
        let site = Arc::new(MockSite::new(ExpansionStrategy::DepthFirst));
        let err = TreeBuilder::new(site, config())
            .build()
            .await
            .expect_err("empty TOC");
        assert!(matches!(err, ScraperError::RootNotFound { .. }));
    }

    #[tokio::test]
    async fn depth_cap_stops_descent() {
        let keys: Vec<String> = (0..25).map(|i| format!("N{i}")).collect();
        let mut site = MockSite::new(ExpansionStrategy::DepthFirst).roots(&["N0"]);
        for (i, key) in keys.iter().enumerate() {
            site = match keys.get(i + 1) {
                Some(next) => site.branch(key, key, &[next.as_str()]),
                None => site.leaf(key, key),
            };
        }
        let site = Arc::new(site);

        let (forest, report) = build(&site, config()).await;

        assert_eq!(report.nodes, 21);
        assert_eq!(report.depth_capped, 1);
        let mut depth = 0;
        let mut node = &forest[0];
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, 20);
        assert_eq!(node.key, "N20");
        assert!(node.children_omitted);
        assert!(!node.is_leaf());
    }

    #[tokio::test]
    async fn cyclic_keys_are_visited_once() {
        let site = Arc::new(
            MockSite::new(ExpansionStrategy::DepthFirst)
                .roots(&["A"])
                .branch("A", "Part A", &["B"])
                .branch("B", "Part B", &["A"]),
        );
        let (forest, report) = build(&site, config()).await;

        assert_eq!(report.nodes, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(forest[0].children[0].key, "B");
        assert!(forest[0].children[0].children.is_empty());
        assert!(forest[0].children[0].has_children());
    }

    #[tokio::test]
    async fn branch_without_children_becomes_leaf_after_polling() {
        let site = Arc::new(
            MockSite::new(ExpansionStrategy::DepthFirst)
                .roots(&["R", "E"])
                .leaf("R", "Reserved")
                .empty_branch("E", "Appendix A"),
        );
        let (forest, report) = build(&site, config()).await;

        assert_eq!(forest.len(), 2);
        assert!(forest[1].is_leaf());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("node E showed no children after 3 polls"));
    }
}
