//! Session reporting
//!
//! Human- and machine-readable views of what a session has learned.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use super::action_key::ActionKey;
use super::learner::CommonPattern;

/// Patterns listed in a summary
pub const SUMMARY_TOP_PATTERNS: usize = 5;

/// Window analysed at the end of a turn
pub const TURN_WINDOW: usize = 3;

/// Turn predictions above this are reported as high-success
pub const HIGH_SUCCESS_CONFIDENCE: f64 = 0.8;

/// Turn predictions below this are reported as low-success
pub const LOW_SUCCESS_CONFIDENCE: f64 = 0.3;

/// Snapshot of a session's learning state
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    /// Nodes in the interaction tree, root included
    pub tree_size: usize,
    /// Actions currently held in the history
    pub total_actions: usize,
    /// Distinct sequence signatures learned
    pub learned_patterns: usize,
    /// Most frequent patterns (frequency >= 3)
    pub common_patterns: Vec<CommonPattern>,
    pub echo_enabled: bool,
    pub echo_threshold: f64,
    /// Length of the current turn path
    pub tree_depth: usize,
    pub max_tree_depth: usize,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session {} summary:", self.session_id)?;
        writeln!(f, "   Tree Size: {} nodes", self.tree_size)?;
        writeln!(f, "   Total Actions: {}", self.total_actions)?;
        writeln!(f, "   Learned Patterns: {}", self.learned_patterns)?;
        writeln!(f, "   Current Depth: {}", self.tree_depth)?;
        writeln!(
            f,
            "   Echo: {} (threshold {:.2})",
            if self.echo_enabled { "enabled" } else { "disabled" },
            self.echo_threshold
        )?;

        if !self.common_patterns.is_empty() {
            writeln!(f, "Top Patterns:")?;
            for p in &self.common_patterns {
                writeln!(
                    f,
                    "   {} (n={}, success={:.1}%)",
                    p.signature,
                    p.frequency,
                    p.success_rate * 100.0
                )?;
            }
        }
        Ok(())
    }
}

/// Notable prediction for the last actions of a turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnInsight {
    HighSuccess {
        sequence: Vec<ActionKey>,
        confidence: f64,
    },
    LowSuccess {
        sequence: Vec<ActionKey>,
        confidence: f64,
    },
}

impl TurnInsight {
    /// Classify a prediction for `sequence`; middling confidence yields nothing
    pub fn classify(sequence: Vec<ActionKey>, confidence: f64) -> Option<Self> {
        if confidence > HIGH_SUCCESS_CONFIDENCE {
            Some(Self::HighSuccess { sequence, confidence })
        } else if confidence < LOW_SUCCESS_CONFIDENCE {
            Some(Self::LowSuccess { sequence, confidence })
        } else {
            None
        }
    }
}

impl fmt::Display for TurnInsight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighSuccess { sequence, confidence } => write!(
                f,
                "High success pattern detected: {} (confidence: {:.1}%)",
                sequence.join(" -> "),
                confidence * 100.0
            ),
            Self::LowSuccess { sequence, confidence } => write!(
                f,
                "Low success pattern detected: {} (confidence: {:.1}%)",
                sequence.join(" -> "),
                confidence * 100.0
            ),
        }
    }
}

/// Result of closing a turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub insight: Option<TurnInsight>,
    /// Whether the session reached its autosave cadence
    pub autosave_due: bool,
}
