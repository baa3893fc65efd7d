//! Action Key Normalization
//!
//! Maps decoded action items to short string keys with bounded cardinality.
//! Keys coarsen the raw parameters so that nearby clicks or texts of similar
//! length share statistics:
//!
//! | item | key |
//! |---|---|
//! | click at (x, y) | `click_region_<x/100>_<y/100>` |
//! | typed text | `type_short` / `type_medium` / `type_long` |
//! | scroll, drag | `scroll_up`, `drag_down`, `scroll_horizontal`, ... |
//! | function call | `function_<name>` |
//! | anything else | its discriminant, or `unknown` |
//!
//! Typed text content never reaches the key, only its length bucket.
//! Function names and discriminants are passed through with any signature
//! separator replaced, so a key never reads as a multi-key signature.

use treecho_common::{ActionItem, ComputerAction};

use super::learner::SIGNATURE_SEPARATOR;

/// Normalized action identifier
pub type ActionKey = String;

/// Grid cell size used to coarsen click coordinates
pub const CLICK_GRID: i64 = 100;

/// Texts shorter than this are `short`
pub const SHORT_TEXT_LIMIT: usize = 10;

/// Texts shorter than this (and not short) are `medium`
pub const MEDIUM_TEXT_LIMIT: usize = 50;

const UNKNOWN: &str = "unknown";

/// Compute the action key for an item
pub fn normalize(item: &ActionItem) -> ActionKey {
    match item {
        ActionItem::ComputerCall(action) => computer_key(action),
        ActionItem::FunctionCall { name } => {
            format!("function_{}", free_text(name.as_deref()))
        }
        ActionItem::Other { kind } => free_text(kind.as_deref()),
    }
}

fn computer_key(action: &ComputerAction) -> ActionKey {
    match action {
        ComputerAction::Click { x, y } => format!(
            "click_region_{}_{}",
            x.div_euclid(CLICK_GRID),
            y.div_euclid(CLICK_GRID)
        ),
        ComputerAction::Type { text } => format!("type_{}", text_bucket(text)),
        ComputerAction::Scroll { scroll_y } => format!("scroll_{}", direction(*scroll_y)),
        ComputerAction::Drag { scroll_y } => format!("drag_{}", direction(*scroll_y)),
        ComputerAction::Other { kind } => free_text(kind.as_deref()),
    }
}

/// Caller-supplied key text, `unknown` when absent
fn free_text(raw: Option<&str>) -> String {
    raw.unwrap_or(UNKNOWN).replace(SIGNATURE_SEPARATOR, "_")
}

/// Length bucket for typed text, counted in characters
fn text_bucket(text: &str) -> &'static str {
    let len = text.chars().count();
    if len < SHORT_TEXT_LIMIT {
        "short"
    } else if len < MEDIUM_TEXT_LIMIT {
        "medium"
    } else {
        "long"
    }
}

fn direction(scroll_y: i64) -> &'static str {
    match scroll_y {
        d if d < 0 => "up",
        d if d > 0 => "down",
        _ => "horizontal",
    }
}
