//! Action descriptors
//!
//! The action-execution agent emits loosely typed JSON items. They are decoded
//! here into a closed set of variants. Decoding never fails: missing numeric
//! fields become 0, missing strings become empty, unknown discriminants are
//! kept in an `Other` arm.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Discriminant for pointer and keyboard actions
pub const COMPUTER_CALL: &str = "computer_call";

/// Discriminant for tool/function invocations
pub const FUNCTION_CALL: &str = "function_call";

/// A single item handed to the agent loop
#[derive(Debug, Clone, PartialEq)]
pub enum ActionItem {
    /// An action executed against the controlled surface
    ComputerCall(ComputerAction),
    /// A named function invocation
    FunctionCall {
        /// Function name, if present
        name: Option<String>,
    },
    /// Any other item (messages, reasoning, ...)
    Other {
        /// Raw `type` discriminant, if present
        kind: Option<String>,
    },
}

/// Type-specific payload of a `computer_call`
#[derive(Debug, Clone, PartialEq)]
pub enum ComputerAction {
    /// Pointer click at screen coordinates
    Click { x: i64, y: i64 },
    /// Text entry
    Type { text: String },
    /// Scroll with a vertical delta
    Scroll { scroll_y: i64 },
    /// Drag with a vertical delta
    Drag { scroll_y: i64 },
    /// Any other computer action (keypress, wait, screenshot, ...)
    Other {
        /// Raw action `type`, if present
        kind: Option<String>,
    },
}

impl ActionItem {
    /// Create a click item
    pub fn click(x: i64, y: i64) -> Self {
        Self::ComputerCall(ComputerAction::Click { x, y })
    }

    /// Create a text-entry item
    pub fn type_text(text: impl Into<String>) -> Self {
        Self::ComputerCall(ComputerAction::Type { text: text.into() })
    }

    /// Create a scroll item
    pub fn scroll(scroll_y: i64) -> Self {
        Self::ComputerCall(ComputerAction::Scroll { scroll_y })
    }

    /// Create a function-call item
    pub fn function(name: impl Into<String>) -> Self {
        Self::FunctionCall {
            name: Some(name.into()),
        }
    }

    /// Decode an item from arbitrary JSON without failing
    pub fn from_value(value: &Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some(COMPUTER_CALL) => {
                let action = value.get("action").unwrap_or(&Value::Null);
                Self::ComputerCall(ComputerAction::from_value(action))
            }
            Some(FUNCTION_CALL) => Self::FunctionCall {
                name: value.get("name").and_then(Value::as_str).map(str::to_string),
            },
            other => Self::Other {
                kind: other.map(str::to_string),
            },
        }
    }

    /// The item's discriminant as it appeared on the wire
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::ComputerCall(_) => Some(COMPUTER_CALL),
            Self::FunctionCall { .. } => Some(FUNCTION_CALL),
            Self::Other { kind } => kind.as_deref(),
        }
    }
}

impl ComputerAction {
    fn from_value(action: &Value) -> Self {
        match action.get("type").and_then(Value::as_str) {
            Some("click") => Self::Click {
                x: int_field(action, "x"),
                y: int_field(action, "y"),
            },
            Some("type") => Self::Type {
                text: action
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            Some("scroll") => Self::Scroll {
                scroll_y: int_field(action, "scroll_y"),
            },
            Some("drag") => Self::Drag {
                scroll_y: int_field(action, "scroll_y"),
            },
            other => Self::Other {
                kind: other.map(str::to_string),
            },
        }
    }
}

/// Read an integer field, accepting floats (floored) and defaulting to 0
fn int_field(value: &Value, field: &str) -> i64 {
    match value.get(field) {
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f.floor() as i64))
            .unwrap_or(0),
        None => 0,
    }
}

impl<'de> Deserialize<'de> for ActionItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}
