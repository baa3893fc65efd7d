//! Interaction Tree
//!
//! A trie of action keys. Each root-to-node path is a sequence of actions
//! that has been navigated at least once; every node carries visit and
//! outcome statistics for the action at the end of its path.
//!
//! Nodes are created lazily by [`InteractionTree::navigate`] and never
//! removed. Statistics change only through [`TreeNode::update_stats`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action_key::ActionKey;

/// Key of the sentinel root node
pub const ROOT_KEY: &str = "root";

/// Metadata captured when a node is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeContext {
    /// Index of this node's key within the navigated path
    pub depth: usize,
    /// Path prefix up to and including this node's key
    pub path: Vec<ActionKey>,
    /// Key of the parent node
    pub parent_key: ActionKey,
}

/// A node of the interaction tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    key: ActionKey,
    context: Option<NodeContext>,
    children: HashMap<ActionKey, TreeNode>,
    frequency: u64,
    total_attempts: u64,
    successful_attempts: u64,
    success_rate: f64,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

impl TreeNode {
    /// Create a fresh node with no statistics
    pub fn new(key: impl Into<ActionKey>, context: Option<NodeContext>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            context,
            children: HashMap::new(),
            frequency: 0,
            total_attempts: 0,
            successful_attempts: 0,
            success_rate: 0.0,
            created_at: now,
            last_accessed: now,
        }
    }

    /// Rebuild a node from persisted statistics.
    ///
    /// Successful attempts are capped at total attempts and the success rate
    /// is recomputed from the counts.
    pub(crate) fn restore(
        key: ActionKey,
        context: Option<NodeContext>,
        stats: NodeStats,
        created_at: DateTime<Utc>,
        last_accessed: DateTime<Utc>,
    ) -> Self {
        let successful_attempts = stats.successful_attempts.min(stats.total_attempts);
        let mut node = Self {
            key,
            context,
            children: HashMap::new(),
            frequency: stats.frequency,
            total_attempts: stats.total_attempts,
            successful_attempts,
            success_rate: 0.0,
            created_at,
            last_accessed,
        };
        node.recompute_success_rate();
        node
    }

    /// Record one visit with its outcome
    pub fn update_stats(&mut self, success: bool) {
        self.total_attempts += 1;
        if success {
            self.successful_attempts += 1;
        }
        self.recompute_success_rate();
        self.frequency += 1;
        self.last_accessed = Utc::now();
    }

    fn recompute_success_rate(&mut self) {
        self.success_rate = if self.total_attempts == 0 {
            0.0
        } else {
            self.successful_attempts as f64 / self.total_attempts as f64
        };
    }

    /// Insert (or replace) a child under `key`
    pub fn add_child(&mut self, key: impl Into<ActionKey>, child: TreeNode) {
        self.children.insert(key.into(), child);
    }

    /// Get a child by key
    pub fn child(&self, key: &str) -> Option<&TreeNode> {
        self.children.get(key)
    }

    /// All children keyed by action key
    pub fn children(&self) -> &HashMap<ActionKey, TreeNode> {
        &self.children
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn context(&self) -> Option<&NodeContext> {
        self.context.as_ref()
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    pub fn successful_attempts(&self) -> u64 {
        self.successful_attempts
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    /// Number of nodes in this subtree, this node included
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children
            .values()
            .map(TreeNode::subtree_size)
            .sum::<usize>()
    }

    /// Scalar statistics of this node
    pub fn stats(&self) -> NodeStats {
        NodeStats {
            frequency: self.frequency,
            total_attempts: self.total_attempts,
            successful_attempts: self.successful_attempts,
        }
    }
}

/// Counters carried by a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub frequency: u64,
    pub total_attempts: u64,
    pub successful_attempts: u64,
}

/// Trie of observed action paths
#[derive(Debug, Clone)]
pub struct InteractionTree {
    root: TreeNode,
}

impl Default for InteractionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionTree {
    /// Create a tree holding only the root
    pub fn new() -> Self {
        Self {
            root: TreeNode::new(ROOT_KEY, None),
        }
    }

    /// Wrap an existing root node
    pub fn from_root(root: TreeNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Walk `path` from the root, creating missing nodes, and return the
    /// node at its last element. An empty path returns the root.
    pub fn navigate(&mut self, path: &[ActionKey]) -> &mut TreeNode {
        let mut current = &mut self.root;

        for (depth, part) in path.iter().enumerate() {
            let parent_key = current.key.clone();
            current = current.children.entry(part.clone()).or_insert_with(|| {
                let context = NodeContext {
                    depth,
                    path: path[..=depth].to_vec(),
                    parent_key,
                };
                TreeNode::new(part.clone(), Some(context))
            });
        }

        current
    }

    /// Look up the node at `path` without creating anything
    pub fn get(&self, path: &[ActionKey]) -> Option<&TreeNode> {
        path.iter()
            .try_fold(&self.root, |node, part| node.children.get(part))
    }

    /// Navigate to `path` and record an outcome on the node found there
    pub fn record(&mut self, path: &[ActionKey], success: bool) -> &TreeNode {
        let node = self.navigate(path);
        node.update_stats(success);
        node
    }

    /// Count of all nodes, root included
    pub fn size(&self) -> usize {
        self.root.subtree_size()
    }
}
