//! TOC flattening.
//!
//! Converts the discovered [`TocNode`] forest into the ordered list of
//! [`FlatSection`]s that makes up the output artifact.

use tracing::{debug, instrument};

use tocscraper_shared::{FlatSection, TocNode};

/// Flatten a forest in preorder.
#[instrument(skip_all, fields(roots = forest.len()))]
pub fn flatten(forest: &[TocNode]) -> Vec<FlatSection> {
    let sections = flatten_with_parent(forest, &[]);
    debug!(sections = sections.len(), "flattened TOC");
    sections
}

/// Flatten a forest in preorder, prefixing every path with `parent_path`.
///
/// Each section's `path` is its parent's path plus its own title, and its
/// `depth` is `path.len() - 1`. `has_children` follows
/// [`TocNode::has_children`], so a node whose children were cut from the tree
/// is still emitted as a branch.
pub fn flatten_with_parent(forest: &[TocNode], parent_path: &[String]) -> Vec<FlatSection> {
    let mut sections = Vec::new();
    let mut stack: Vec<(&TocNode, Vec<String>)> = forest
        .iter()
        .rev()
        .map(|node| (node, parent_path.to_vec()))
        .collect();

    while let Some((node, mut path)) = stack.pop() {
        path.push(node.title.clone());

        for child in node.children.iter().rev() {
            stack.push((child, path.clone()));
        }

        sections.push(FlatSection {
            key: node.key.clone(),
            value: node.title.clone(),
            depth: path.len() - 1,
            path,
            url: node.url.clone(),
            has_children: node.has_children(),
            html: None,
            html_error: None,
        });
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(key: &str, children: Vec<TocNode>) -> TocNode {
        let mut n = TocNode::new(key, key);
        n.children = children;
        n.expansion_attempted = true;
        n
    }

    /// `A[B, C[D]]`
    fn sample() -> Vec<TocNode> {
        vec![node(
            "A",
            vec![node("B", vec![]), node("C", vec![node("D", vec![])])],
        )]
    }

    fn count_leaf_nodes(forest: &[TocNode]) -> usize {
        forest
            .iter()
            .map(|n| {
                if n.children_omitted {
                    0
                } else if n.children.is_empty() {
                    1
                } else {
                    count_leaf_nodes(&n.children)
                }
            })
            .sum()
    }

    #[test]
    fn flattens_sample_tree_in_preorder() {
        let sections = flatten(&sample());

        let summary: Vec<(&str, usize, Vec<&str>, bool)> = sections
            .iter()
            .map(|s| {
                (
                    s.value.as_str(),
                    s.depth,
                    s.path.iter().map(String::as_str).collect(),
                    s.has_children,
                )
            })
            .collect();

        assert_eq!(
            summary,
            vec![
                ("A", 0, vec!["A"], true),
                ("B", 1, vec!["A", "B"], false),
                ("C", 1, vec!["A", "C"], true),
                ("D", 2, vec!["A", "C", "D"], false),
            ]
        );

        let leaves: Vec<&str> = sections
            .iter()
            .filter(|s| s.is_leaf())
            .map(|s| s.value.as_str())
            .collect();
        assert_eq!(leaves, vec!["B", "D"]);
    }

    #[test]
    fn node_with_omitted_children_is_not_a_leaf() {
        let mut capped = node("C", vec![]);
        capped.children_omitted = true;
        let forest = vec![node("A", vec![node("B", vec![]), capped])];

        let sections = flatten(&forest);
        assert!(sections[2].has_children);
        let leaves: Vec<&str> = sections
            .iter()
            .filter(|s| s.is_leaf())
            .map(|s| s.value.as_str())
            .collect();
        assert_eq!(leaves, vec!["B"]);
        assert_eq!(leaves.len(), count_leaf_nodes(&forest));
    }

    #[test]
    fn flatten_is_deterministic() {
        let forest = vec![
            node("T1", vec![node("C1", vec![node("S1", vec![]), node("S2", vec![])])]),
            node("T2", vec![node("C2", vec![])]),
            node("T3", vec![]),
        ];
        assert_eq!(flatten(&forest), flatten(&forest));
    }

    #[test]
    fn path_and_depth_invariants_hold() {
        let forest = vec![
            node("T1", vec![node("C1", vec![node("S1", vec![node("P1", vec![])])])]),
            node("T2", vec![node("C2", vec![]), node("C3", vec![node("S3", vec![])])]),
        ];
        let sections = flatten(&forest);

        // In preorder, a node's parent is the closest earlier section one level up.
        for (i, section) in sections.iter().enumerate() {
            assert_eq!(section.depth, section.path.len() - 1);
            assert_eq!(section.path.last(), Some(&section.value));
            if section.depth == 0 {
                assert_eq!(section.path, vec![section.value.clone()]);
                continue;
            }
            let parent = sections[..i]
                .iter()
                .rev()
                .find(|p| p.depth + 1 == section.depth)
                .expect("parent precedes child");
            assert_eq!(section.path[..section.path.len() - 1], parent.path[..]);
        }
    }

    #[test]
    fn leaf_count_matches_childless_nodes() {
        let forest = vec![
            node("T1", vec![node("C1", vec![node("S1", vec![]), node("S2", vec![])])]),
            node("T2", vec![node("C2", vec![])]),
            node("T3", vec![]),
        ];
        let leaves = flatten(&forest).iter().filter(|s| !s.has_children).count();
        assert_eq!(leaves, count_leaf_nodes(&forest));
        assert_eq!(leaves, 4);
    }

    #[test]
    fn parent_path_prefixes_every_section() {
        let parent = vec!["Code of Ordinances".to_string()];
        let sections = flatten_with_parent(&sample(), &parent);
        assert_eq!(sections[0].path, vec!["Code of Ordinances", "A"]);
        assert_eq!(sections[0].depth, 1);
        assert_eq!(sections[3].depth, 3);
    }

    #[test]
    fn empty_forest_flattens_to_nothing() {
        assert!(flatten(&[]).is_empty());
    }
}
