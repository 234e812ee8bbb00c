//! Links topics across levels into a single rooted tree.
//!
//! A topic at level `i + 1` becomes a child of the level-`i` topic whose
//! members contain its centroid document. Stored levels are full partitions
//! with member centroids, so a parent always exists for index-backed levels;
//! a topic whose centroid is found nowhere in the previous level is attached
//! to the root with a warning.

use std::fmt::Write;

use docscope_index::{DocumentIndex, TopicMetadata};
use docscope_types::{LevelKey, Result};
use serde::Serialize;
use tracing::{debug, warn};

/// One node of a topic tree. The root has no topic and covers every document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicTreeNode {
    /// `None` for the synthetic root
    pub topic: Option<TopicMetadata>,
    /// Documents in the whole index, for percentages
    pub total_document_count: usize,
    pub children: Vec<TopicTreeNode>,
}

impl TopicTreeNode {
    fn root(total_document_count: usize) -> Self {
        Self {
            topic: None,
            total_document_count,
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.topic.is_none()
    }

    /// Documents covered by this node.
    pub fn member_count(&self) -> usize {
        match &self.topic {
            Some(topic) => topic.size(),
            None => self.total_document_count,
        }
    }

    /// Share of all documents covered by this node, in percent.
    pub fn percentage(&self) -> f64 {
        if self.total_document_count == 0 {
            return 0.0;
        }
        100.0 * self.member_count() as f64 / self.total_document_count as f64
    }

    /// Number of levels below this node (0 for a leaf).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Pre-order traversal, starting with this node.
    pub fn iter(&self) -> TreeIter<'_> {
        TreeIter { stack: vec![self] }
    }

    /// Indented outline, one line per node.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, indent: usize) {
        let name = match &self.topic {
            Some(topic) => topic.display_label(),
            None => "All documents".to_string(),
        };
        let _ = writeln!(
            out,
            "{:indent$}{} ({} documents, {:.1}%)",
            "",
            name,
            self.member_count(),
            self.percentage(),
            indent = indent * 2
        );
        for child in &self.children {
            child.render_into(out, indent + 1);
        }
    }
}

/// Pre-order iterator over a [`TopicTreeNode`].
pub struct TreeIter<'a> {
    stack: Vec<&'a TopicTreeNode>,
}

impl<'a> Iterator for TreeIter<'a> {
    type Item = &'a TopicTreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Builds [`TopicTreeNode`] trees from levels stored on an index.
#[derive(Debug, Clone, Copy)]
pub struct TopicTreeBuilder {
    sort_children: bool,
}

impl Default for TopicTreeBuilder {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TopicTreeBuilder {
    /// `sort_children` orders siblings by member count, largest first.
    pub fn new(sort_children: bool) -> Self {
        Self { sort_children }
    }

    /// Link the given levels, coarsest first. Every key must exist on the
    /// index, otherwise `UnknownLevel`.
    pub fn build(&self, index: &DocumentIndex, keys: &[LevelKey]) -> Result<TopicTreeNode> {
        let levels: Vec<&[TopicMetadata]> = keys
            .iter()
            .map(|key| index.topic_level(key))
            .collect::<Result<_>>()?;

        // parents[i][j]: parent of topic j of level i within level i - 1
        let mut parents: Vec<Vec<Option<usize>>> = Vec::with_capacity(levels.len());
        for (depth, level) in levels.iter().enumerate() {
            let links = match depth.checked_sub(1).map(|d| levels[d]) {
                None => vec![None; level.len()],
                Some(previous) => level
                    .iter()
                    .map(|topic| {
                        let parent = previous.iter().position(|p| p.contains(topic.centroid_id));
                        if parent.is_none() {
                            warn!(
                                level = %topic.level_key,
                                topic = topic.topic_index,
                                centroid = topic.centroid_id,
                                "Topic centroid not found in previous level, attaching to root"
                            );
                        }
                        parent
                    })
                    .collect(),
            };
            parents.push(links);
        }

        let mut root = TopicTreeNode::root(index.len());
        for (depth, links) in parents.iter().enumerate() {
            for (position, parent) in links.iter().enumerate() {
                if parent.is_none() {
                    root.children
                        .push(self.node(&levels, &parents, depth, position, index.len()));
                }
            }
        }
        self.sort(&mut root);

        debug!(levels = keys.len(), nodes = root.iter().count(), "Built topic tree");
        Ok(root)
    }

    fn node(
        &self,
        levels: &[&[TopicMetadata]],
        parents: &[Vec<Option<usize>>],
        depth: usize,
        position: usize,
        total: usize,
    ) -> TopicTreeNode {
        let children = match parents.get(depth + 1) {
            Some(next) => next
                .iter()
                .enumerate()
                .filter(|(_, parent)| **parent == Some(position))
                .map(|(child, _)| self.node(levels, parents, depth + 1, child, total))
                .collect(),
            None => Vec::new(),
        };
        TopicTreeNode {
            topic: Some(levels[depth][position].clone()),
            total_document_count: total,
            children,
        }
    }

    fn sort(&self, node: &mut TopicTreeNode) {
        if self.sort_children {
            node.children
                .sort_by(|a, b| b.member_count().cmp(&a.member_count()));
        }
        for child in node.children.iter_mut() {
            self.sort(child);
        }
    }
}
