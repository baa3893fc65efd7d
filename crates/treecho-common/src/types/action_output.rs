//! Result payload returned by the action executor

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Items produced by executing one action (screenshots, call outputs, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    pub items: Vec<Value>,
}

impl ActionOutput {
    /// Create an output from result items
    pub fn new(items: Vec<Value>) -> Self {
        Self { items }
    }

    /// Whether any result item reports a logical failure.
    ///
    /// An item fails when its `type` is `"error"` or its `status` is
    /// `"failed"` or `"error"`.
    pub fn reports_failure(&self) -> bool {
        self.items.iter().any(|item| {
            let kind = item.get("type").and_then(Value::as_str);
            let status = item.get("status").and_then(Value::as_str);
            kind == Some("error") || matches!(status, Some("failed") | Some("error"))
        })
    }

    /// Whether the action counts as a success
    pub fn is_success(&self) -> bool {
        !self.reports_failure()
    }
}
