//! Sequence Pattern Learner
//!
//! Frequency-based success estimation for short action sequences.
//!
//! Every observed sequence is reduced to a signature (its keys joined with
//! [`SIGNATURE_SEPARATOR`]). For each signature the learner keeps an
//! occurrence count and the ordered list of outcomes. Prediction falls back
//! in three steps:
//!
//! 1. exact signature: mean of its outcomes
//! 2. longest known trailing suffix: mean of its outcomes × [`SUFFIX_DISCOUNT`]
//! 3. nothing known: [`DEFAULT_PROBABILITY`]

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use super::action_key::ActionKey;

/// Separator between keys in a signature
pub const SIGNATURE_SEPARATOR: &str = "->";

/// Capacity of the recent-sequence log
pub const RECENT_LOG_CAPACITY: usize = 1000;

/// Confidence factor applied to suffix matches
pub const SUFFIX_DISCOUNT: f64 = 0.8;

/// Prediction when no overlapping data exists
pub const DEFAULT_PROBABILITY: f64 = 0.5;

/// Default minimum frequency for common patterns
pub const DEFAULT_MIN_FREQUENCY: u64 = 3;

/// Join keys into a signature
pub fn signature(sequence: &[ActionKey]) -> String {
    sequence.join(SIGNATURE_SEPARATOR)
}

/// A frequently observed signature with its success rate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonPattern {
    pub signature: String,
    pub frequency: u64,
    pub success_rate: f64,
}

/// One entry of the recent-sequence log
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSequence {
    pub sequence: Vec<ActionKey>,
    pub success: bool,
}

/// Online learner of sequence outcomes
#[derive(Debug, Clone)]
pub struct SequencePatternLearner {
    pattern_frequencies: HashMap<String, u64>,
    success_outcomes: HashMap<String, Vec<bool>>,
    recent_sequences: VecDeque<ObservedSequence>,
    recent_capacity: usize,
}

impl Default for SequencePatternLearner {
    fn default() -> Self {
        Self::new()
    }
}

impl SequencePatternLearner {
    /// Create an empty learner
    pub fn new() -> Self {
        Self::with_capacity(RECENT_LOG_CAPACITY)
    }

    /// Create an empty learner with a custom recent-log capacity
    pub fn with_capacity(recent_capacity: usize) -> Self {
        Self {
            pattern_frequencies: HashMap::new(),
            success_outcomes: HashMap::new(),
            recent_sequences: VecDeque::with_capacity(recent_capacity.min(RECENT_LOG_CAPACITY)),
            recent_capacity,
        }
    }

    /// Rebuild a learner from persisted outcome lists.
    ///
    /// Frequencies are taken from the outcome list lengths so that the
    /// count/outcome invariant holds even for hand-edited documents.
    pub(crate) fn from_outcomes(success_outcomes: HashMap<String, Vec<bool>>) -> Self {
        let pattern_frequencies = success_outcomes
            .iter()
            .map(|(sig, outcomes)| (sig.clone(), outcomes.len() as u64))
            .collect();
        Self {
            pattern_frequencies,
            success_outcomes,
            ..Self::new()
        }
    }

    /// Record one occurrence of `sequence` with its outcome
    pub fn observe(&mut self, sequence: &[ActionKey], success: bool) {
        let sig = signature(sequence);
        *self.pattern_frequencies.entry(sig.clone()).or_insert(0) += 1;
        self.success_outcomes.entry(sig).or_default().push(success);

        if self.recent_capacity == 0 {
            return;
        }
        if self.recent_sequences.len() >= self.recent_capacity {
            self.recent_sequences.pop_front();
        }
        self.recent_sequences.push_back(ObservedSequence {
            sequence: sequence.to_vec(),
            success,
        });
    }

    /// Estimate the probability that `sequence` succeeds
    pub fn predict(&self, sequence: &[ActionKey]) -> f64 {
        if sequence.is_empty() {
            return DEFAULT_PROBABILITY;
        }

        if let Some(rate) = self.mean_outcome(&signature(sequence)) {
            return rate;
        }

        // Longest suffix first, down to a single key
        let n = sequence.len();
        for len in (1..n).rev() {
            if let Some(rate) = self.mean_outcome(&signature(&sequence[n - len..])) {
                return rate * SUFFIX_DISCOUNT;
            }
        }

        DEFAULT_PROBABILITY
    }

    fn mean_outcome(&self, sig: &str) -> Option<f64> {
        let outcomes = self.success_outcomes.get(sig)?;
        if outcomes.is_empty() {
            return None;
        }
        let successes = outcomes.iter().filter(|s| **s).count();
        Some(successes as f64 / outcomes.len() as f64)
    }

    /// Signatures seen at least `min_frequency` times, most frequent first.
    ///
    /// Ties are ordered by signature so results are stable across runs.
    pub fn common_patterns(&self, min_frequency: u64) -> Vec<CommonPattern> {
        let mut patterns: Vec<CommonPattern> = self
            .pattern_frequencies
            .iter()
            .filter(|(_, freq)| **freq >= min_frequency)
            .filter_map(|(sig, freq)| {
                self.mean_outcome(sig).map(|success_rate| CommonPattern {
                    signature: sig.clone(),
                    frequency: *freq,
                    success_rate,
                })
            })
            .collect();

        patterns.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        patterns
    }

    /// Number of distinct signatures learned
    pub fn pattern_count(&self) -> usize {
        self.pattern_frequencies.len()
    }

    /// Occurrence count of a signature
    pub fn frequency(&self, sig: &str) -> u64 {
        self.pattern_frequencies.get(sig).copied().unwrap_or(0)
    }

    /// Outcome list of a signature
    pub fn outcomes(&self, sig: &str) -> Option<&[bool]> {
        self.success_outcomes.get(sig).map(Vec::as_slice)
    }

    pub fn pattern_frequencies(&self) -> &HashMap<String, u64> {
        &self.pattern_frequencies
    }

    pub fn success_outcomes(&self) -> &HashMap<String, Vec<bool>> {
        &self.success_outcomes
    }

    /// Recent observations, oldest first
    pub fn recent_sequences(&self) -> impl Iterator<Item = &ObservedSequence> {
        self.recent_sequences.iter()
    }

    pub fn recent_len(&self) -> usize {
        self.recent_sequences.len()
    }
}
