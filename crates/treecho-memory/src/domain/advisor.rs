//! Echo Advisor
//!
//! Decides whether an upcoming action deserves an advisory ("echo") for the
//! operator. Two conditions must hold:
//!
//! - the learner's prediction for the recent window plus the candidate is
//!   strictly above the threshold, and
//! - one of the top common patterns mentions the candidate and has a success
//!   rate above [`MIN_PATTERN_SUCCESS`].
//!
//! The advisor only reads from the learner.

use std::fmt;

use serde::Serialize;

use super::action_key::ActionKey;
use super::learner::{SequencePatternLearner, DEFAULT_MIN_FREQUENCY};

/// Number of history entries joined with the candidate
pub const HISTORY_WINDOW: usize = 5;

/// Number of top common patterns scanned for backing
pub const TOP_PATTERNS: usize = 3;

/// Success rate a backing pattern must exceed
pub const MIN_PATTERN_SUCCESS: f64 = 0.8;

/// An advisory citing a learned pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    /// The backing pattern signature
    pub pattern: String,
    /// Success rate of the backing pattern
    pub success_rate: f64,
    /// Times the backing pattern was observed
    pub frequency: u64,
    /// Prediction for the queried window
    pub probability: f64,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Echo: Similar pattern '{}' succeeded {:.1}% of the time (n={})",
            self.pattern,
            self.success_rate * 100.0,
            self.frequency
        )
    }
}

/// Confidence-gated advisory generator
#[derive(Debug, Clone)]
pub struct EchoAdvisor {
    pub window: usize,
    pub top_patterns: usize,
    pub min_pattern_frequency: u64,
    pub min_pattern_success: f64,
}

impl Default for EchoAdvisor {
    fn default() -> Self {
        Self {
            window: HISTORY_WINDOW,
            top_patterns: TOP_PATTERNS,
            min_pattern_frequency: DEFAULT_MIN_FREQUENCY,
            min_pattern_success: MIN_PATTERN_SUCCESS,
        }
    }
}

impl EchoAdvisor {
    /// Build the query: the last `window` history keys plus the candidate
    pub fn query_sequence(&self, history: &[ActionKey], candidate: &str) -> Vec<ActionKey> {
        let start = history.len().saturating_sub(self.window);
        let mut query = history[start..].to_vec();
        query.push(candidate.to_string());
        query
    }

    /// Produce an advisory for `candidate`, if warranted
    pub fn advise(
        &self,
        history: &[ActionKey],
        candidate: &str,
        threshold: f64,
        learner: &SequencePatternLearner,
    ) -> Option<Advisory> {
        let query = self.query_sequence(history, candidate);
        let probability = learner.predict(&query);

        if probability <= threshold {
            return None;
        }

        learner
            .common_patterns(self.min_pattern_frequency)
            .into_iter()
            .take(self.top_patterns)
            .find(|p| p.signature.contains(candidate) && p.success_rate > self.min_pattern_success)
            .map(|p| Advisory {
                pattern: p.signature,
                success_rate: p.success_rate,
                frequency: p.frequency,
                probability,
            })
    }
}
