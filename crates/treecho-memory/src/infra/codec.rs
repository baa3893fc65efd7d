//! Persistence Codec
//!
//! Converts an interaction tree and a sequence learner to and from a JSON
//! document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "tree": { "key", "context", "frequency", "success_rate", "total_attempts",
//!             "successful_attempts", "created_at", "last_accessed",
//!             "children": { <key>: <node>, ... } },
//!   "patterns": { "frequencies": { <signature>: <count> },
//!                 "outcomes":    { <signature>: [<bool>, ...] } }
//! }
//! ```
//!
//! Decoding is lenient: absent or mistyped fields fall back to defaults and
//! an absent document yields an empty tree and learner. The learner's recent
//! log is not persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::domain::action_key::ActionKey;
use crate::domain::learner::SequencePatternLearner;
use crate::domain::tree::{InteractionTree, NodeContext, NodeStats, TreeNode, ROOT_KEY};

/// Current document version
pub const DOCUMENT_VERSION: u64 = 1;

/// Stateless encoder/decoder for session documents
pub struct PersistenceCodec;

impl PersistenceCodec {
    /// Encode a tree and learner as one document
    pub fn serialize(tree: &InteractionTree, learner: &SequencePatternLearner) -> Value {
        json!({
            "version": DOCUMENT_VERSION,
            "tree": Self::encode_node(tree.root()),
            "patterns": {
                "frequencies": learner.pattern_frequencies(),
                "outcomes": learner.success_outcomes(),
            },
        })
    }

    /// Decode a document, applying defaults for anything missing
    pub fn deserialize(document: Option<&Value>) -> (InteractionTree, SequencePatternLearner) {
        let Some(document) = document else {
            return (InteractionTree::new(), SequencePatternLearner::new());
        };

        let tree = match document.get("tree") {
            Some(root) if root.is_object() => {
                InteractionTree::from_root(Self::decode_node(root, ROOT_KEY))
            }
            _ => InteractionTree::new(),
        };

        // Documents written by the earlier tool used "ml_patterns"
        let patterns = document
            .get("patterns")
            .or_else(|| document.get("ml_patterns"));
        let learner = patterns
            .map(Self::decode_patterns)
            .unwrap_or_default();

        (tree, learner)
    }

    fn encode_node(node: &TreeNode) -> Value {
        let children: Map<String, Value> = node
            .children()
            .iter()
            .map(|(key, child)| (key.clone(), Self::encode_node(child)))
            .collect();

        json!({
            "key": node.key(),
            "context": node.context(),
            "frequency": node.frequency(),
            "success_rate": node.success_rate(),
            "total_attempts": node.total_attempts(),
            "successful_attempts": node.successful_attempts(),
            "created_at": node.created_at().to_rfc3339(),
            "last_accessed": node.last_accessed().to_rfc3339(),
            "children": children,
        })
    }

    fn decode_node(value: &Value, fallback_key: &str) -> TreeNode {
        let key = value
            .get("key")
            .or_else(|| value.get("action_type"))
            .and_then(Value::as_str)
            .unwrap_or(fallback_key)
            .to_string();

        let stats = NodeStats {
            frequency: u64_field(value, "frequency"),
            total_attempts: u64_field(value, "total_attempts"),
            successful_attempts: u64_field(value, "successful_attempts"),
        };

        let mut node = TreeNode::restore(
            key,
            value.get("context").and_then(decode_context),
            stats,
            time_field(value, "created_at"),
            time_field(value, "last_accessed"),
        );

        if let Some(children) = value.get("children").and_then(Value::as_object) {
            for (child_key, child) in children {
                if child.is_object() {
                    node.add_child(child_key.clone(), Self::decode_node(child, child_key));
                }
            }
        }

        node
    }

    fn decode_patterns(patterns: &Value) -> SequencePatternLearner {
        let outcomes = patterns
            .get("outcomes")
            .or_else(|| patterns.get("success_patterns"))
            .and_then(Value::as_object);

        let mut success_outcomes: HashMap<String, Vec<bool>> = HashMap::new();
        if let Some(outcomes) = outcomes {
            for (sig, list) in outcomes {
                let list: Vec<bool> = list
                    .as_array()
                    .map(|items| items.iter().filter_map(Value::as_bool).collect())
                    .unwrap_or_default();
                if !list.is_empty() {
                    success_outcomes.insert(sig.clone(), list);
                }
            }
        }

        if let Some(frequencies) = patterns.get("frequencies").and_then(Value::as_object) {
            for (sig, freq) in frequencies {
                let recorded = success_outcomes.get(sig).map_or(0, Vec::len) as u64;
                if freq.as_u64() != Some(recorded) {
                    warn!(
                        signature = %sig,
                        frequency = %freq,
                        outcomes = recorded,
                        "Pattern frequency disagrees with outcome list, using outcome count"
                    );
                }
            }
        }

        SequencePatternLearner::from_outcomes(success_outcomes)
    }
}

fn decode_context(value: &Value) -> Option<NodeContext> {
    let obj = value.as_object()?;
    let path: Vec<ActionKey> = obj
        .get("path")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let parent_key = obj
        .get("parent_key")
        .or_else(|| obj.get("parent_type"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(NodeContext {
        depth: obj.get("depth").and_then(Value::as_u64).unwrap_or(0) as usize,
        path,
        parent_key,
    })
}

fn u64_field(value: &Value, field: &str) -> u64 {
    value.get(field).and_then(Value::as_u64).unwrap_or(0)
}

fn time_field(value: &Value, field: &str) -> DateTime<Utc> {
    value
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
