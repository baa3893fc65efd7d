//! Echo Session
//!
//! One agent session: an interaction tree and a sequence learner updated in
//! lockstep for every handled action, plus the turn path and action history
//! that drive them. For each action item the session
//!
//! 1. normalizes the item to an action key,
//! 2. navigates (creating if needed) the node at `current_path + [key]`,
//! 3. asks the echo advisor for an advisory,
//! 4. hands the item to the executor,
//! 5. records the outcome on the node and in the learner.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use treecho_common::{ActionItem, ActionOutput, ExecutionError, TreechoError};

use super::action_key::{normalize, ActionKey};
use super::advisor::{Advisory, EchoAdvisor};
use super::learner::{SequencePatternLearner, DEFAULT_MIN_FREQUENCY};
use super::summary::{SessionSummary, TurnInsight, TurnReport, SUMMARY_TOP_PATTERNS, TURN_WINDOW};
use super::tree::InteractionTree;
use crate::infra::codec::PersistenceCodec;

/// History length that triggers trimming
pub const MAX_HISTORY: usize = 100;

/// History entries kept after trimming
pub const HISTORY_RETAIN: usize = 50;

/// Keys per observed learner sequence
pub const OBSERVED_SEQUENCE_LEN: usize = 2;

/// Bring an echo threshold into [0, 1]; non-finite values fall back to the default
pub fn sanitize_threshold(threshold: f64) -> f64 {
    if threshold.is_finite() {
        threshold.clamp(0.0, 1.0)
    } else {
        crate::DEFAULT_ECHO_THRESHOLD
    }
}

/// Executes action items against the controlled environment
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, item: &ActionItem) -> Result<ActionOutput, ExecutionError>;
}

/// Per-session knobs
#[derive(Debug, Clone, Serialize)]
pub struct SessionSettings {
    pub echo_enabled: bool,
    /// Prediction an advisory must exceed, in [0, 1]
    pub echo_threshold: f64,
    /// Reported only; the tree itself is not depth-limited
    pub max_tree_depth: usize,
    /// Autosave when the history length is a multiple of this (0 disables)
    pub autosave_every: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            echo_enabled: true,
            echo_threshold: crate::DEFAULT_ECHO_THRESHOLD,
            max_tree_depth: crate::DEFAULT_MAX_TREE_DEPTH,
            autosave_every: crate::DEFAULT_AUTOSAVE_EVERY,
        }
    }
}

/// An action whose node exists and whose outcome is pending
#[derive(Debug, Clone)]
pub struct PreparedAction {
    pub key: ActionKey,
    /// Tree path of the action's node
    pub path: Vec<ActionKey>,
    /// Learner sequence to observe once the outcome is known
    pub sequence: Option<Vec<ActionKey>>,
    pub advisory: Option<Advisory>,
}

/// Outcome of recording one action
#[derive(Debug, Clone, Serialize)]
pub struct RecordedAction {
    pub action_key: ActionKey,
    pub success: bool,
    pub advisory: Option<Advisory>,
    /// Success rate of the action's node after the update
    pub node_success_rate: f64,
}

/// A single agent session
pub struct EchoSession {
    id: Uuid,
    tree: InteractionTree,
    learner: SequencePatternLearner,
    advisor: EchoAdvisor,
    settings: SessionSettings,
    current_path: Vec<ActionKey>,
    action_history: Vec<ActionKey>,
}

impl EchoSession {
    /// Create an empty session
    pub fn new(id: Uuid, settings: SessionSettings) -> Self {
        Self::from_parts(id, settings, InteractionTree::new(), SequencePatternLearner::new())
    }

    /// Create a session over an existing tree and learner
    pub fn from_parts(
        id: Uuid,
        mut settings: SessionSettings,
        tree: InteractionTree,
        learner: SequencePatternLearner,
    ) -> Self {
        settings.echo_threshold = sanitize_threshold(settings.echo_threshold);
        Self {
            id,
            tree,
            learner,
            advisor: EchoAdvisor::default(),
            settings,
            current_path: Vec::new(),
            action_history: Vec::new(),
        }
    }

    /// Create a session from a persisted document (`None` yields an empty one)
    pub fn from_document(id: Uuid, settings: SessionSettings, document: Option<&Value>) -> Self {
        let (tree, learner) = PersistenceCodec::deserialize(document);
        Self::from_parts(id, settings, tree, learner)
    }

    /// Encode the tree and learner for persistence
    pub fn to_document(&self) -> Value {
        PersistenceCodec::serialize(&self.tree, &self.learner)
    }

    /// Start a turn: every action of the turn is filed under a node derived
    /// from the user input
    pub fn begin_turn(&mut self, user_input: &str) -> &[ActionKey] {
        let digest = blake3::hash(user_input.as_bytes()).to_hex();
        self.current_path = vec![format!("input_{}", &digest.as_str()[..8])];
        debug!(session = %self.id, path = ?self.current_path, "Turn started");
        &self.current_path
    }

    /// Close a turn: classify the last actions and report autosave cadence
    pub fn end_turn(&self) -> TurnReport {
        let insight = if self.action_history.len() >= TURN_WINDOW {
            let recent = self.action_history[self.action_history.len() - TURN_WINDOW..].to_vec();
            let confidence = self.learner.predict(&recent);
            TurnInsight::classify(recent, confidence)
        } else {
            None
        };

        if let Some(insight) = &insight {
            info!(session = %self.id, "{}", insight);
        }

        let autosave_due = self.settings.autosave_every > 0
            && self.action_history.len() % self.settings.autosave_every == 0;

        TurnReport {
            insight,
            autosave_due,
        }
    }

    /// Steps 1-3: key, node, advisory. The key joins the history here.
    pub fn prepare(&mut self, item: &ActionItem) -> PreparedAction {
        let key = normalize(item);

        let mut path = self.current_path.clone();
        path.push(key.clone());
        self.tree.navigate(&path);

        let advisory = if self.settings.echo_enabled {
            self.advisor
                .advise(&self.action_history, &key, self.settings.echo_threshold, &self.learner)
        } else {
            None
        };
        if let Some(advisory) = &advisory {
            info!(session = %self.id, "{}", advisory);
        }

        self.action_history.push(key.clone());
        if self.action_history.len() > MAX_HISTORY {
            let cut = self.action_history.len() - HISTORY_RETAIN;
            self.action_history.drain(..cut);
        }

        let sequence = (self.action_history.len() >= OBSERVED_SEQUENCE_LEN).then(|| {
            self.action_history[self.action_history.len() - OBSERVED_SEQUENCE_LEN..].to_vec()
        });

        PreparedAction {
            key,
            path,
            sequence,
            advisory,
        }
    }

    /// Step 5: record the outcome on the node and in the learner
    pub fn complete(&mut self, prepared: PreparedAction, success: bool) -> RecordedAction {
        let node = self.tree.navigate(&prepared.path);
        node.update_stats(success);
        let node_success_rate = node.success_rate();

        if let Some(sequence) = &prepared.sequence {
            self.learner.observe(sequence, success);
        }

        RecordedAction {
            action_key: prepared.key,
            success,
            advisory: prepared.advisory,
            node_success_rate,
        }
    }

    /// Record an action executed elsewhere whose outcome is already known
    pub fn record(&mut self, item: &ActionItem, success: bool) -> RecordedAction {
        let prepared = self.prepare(item);
        self.complete(prepared, success)
    }

    /// Run one item through the full loop, delegating execution.
    ///
    /// The action succeeds when the executor returns without error and no
    /// result item reports failure. Execution errors are recorded as failures
    /// before being returned.
    pub async fn handle_item(
        &mut self,
        item: &ActionItem,
        executor: &dyn ActionExecutor,
    ) -> Result<(ActionOutput, RecordedAction), TreechoError> {
        let prepared = self.prepare(item);
        let result = executor.execute(item).await;
        self.settle(prepared, result)
    }

    /// Record the executor's result for a prepared action
    pub fn settle(
        &mut self,
        prepared: PreparedAction,
        result: Result<ActionOutput, ExecutionError>,
    ) -> Result<(ActionOutput, RecordedAction), TreechoError> {
        match result {
            Ok(output) => {
                let recorded = self.complete(prepared, output.is_success());
                Ok((output, recorded))
            }
            Err(e) => {
                let recorded = self.complete(prepared, false);
                warn!(session = %self.id, action = %recorded.action_key, "Action failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Success estimate for an arbitrary key sequence
    pub fn predict(&self, sequence: &[ActionKey]) -> f64 {
        self.learner.predict(sequence)
    }

    pub fn set_echo_enabled(&mut self, enabled: bool) {
        self.settings.echo_enabled = enabled;
    }

    /// Set the echo threshold, clamped into [0, 1]
    pub fn set_echo_threshold(&mut self, threshold: f64) {
        self.settings.echo_threshold = sanitize_threshold(threshold);
    }

    /// Snapshot for reporting
    pub fn summary(&self) -> SessionSummary {
        let mut common_patterns = self.learner.common_patterns(DEFAULT_MIN_FREQUENCY);
        common_patterns.truncate(SUMMARY_TOP_PATTERNS);

        SessionSummary {
            session_id: self.id,
            tree_size: self.tree.size(),
            total_actions: self.action_history.len(),
            learned_patterns: self.learner.pattern_count(),
            common_patterns,
            echo_enabled: self.settings.echo_enabled,
            echo_threshold: self.settings.echo_threshold,
            tree_depth: self.current_path.len(),
            max_tree_depth: self.settings.max_tree_depth,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tree(&self) -> &InteractionTree {
        &self.tree
    }

    pub fn learner(&self) -> &SequencePatternLearner {
        &self.learner
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn current_path(&self) -> &[ActionKey] {
        &self.current_path
    }

    pub fn action_history(&self) -> &[ActionKey] {
        &self.action_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use treecho_common::ComputerAction;

    fn session() -> EchoSession {
        EchoSession::new(Uuid::new_v4(), SessionSettings::default())
    }

    #[test]
    fn test_begin_turn_sets_input_path() {
        let mut s = session();
        let path = s.begin_turn("open the settings page").to_vec();

        assert_eq!(path.len(), 1);
        assert!(path[0].starts_with("input_"));
        assert_eq!(path[0].len(), "input_".len() + 8);

        // Same input, same context node
        let mut other = session();
        assert_eq!(other.begin_turn("open the settings page"), &path[..]);
    }

    #[test]
    fn test_record_updates_tree_and_learner() {
        let mut s = session();
        s.begin_turn("search");

        let first = s.record(&ActionItem::click(100, 200), true);
        assert_eq!(first.action_key, "click_region_1_2");
        // A single action is not yet a sequence
        assert_eq!(s.learner().pattern_count(), 0);

        s.record(&ActionItem::type_text("rust"), true);

        let node_path = vec![s.current_path()[0].clone(), "type_short".to_string()];
        let node = s.tree().get(&node_path).unwrap();
        assert_eq!(node.total_attempts(), 1);
        assert_eq!(s.learner().frequency("click_region_1_2->type_short"), 1);
        assert_eq!(s.action_history().len(), 2);
        assert_eq!(s.tree().size(), 4);
    }

    #[test]
    fn test_history_trimming() {
        let mut s = session();
        for i in 0..=MAX_HISTORY {
            s.record(&ActionItem::function(format!("f{i}")), true);
        }

        assert_eq!(s.action_history().len(), HISTORY_RETAIN);
        assert_eq!(s.action_history().last().unwrap(), &format!("function_f{MAX_HISTORY}"));
    }

    #[test]
    fn test_echo_after_repeated_pattern() {
        let mut s = session();
        s.begin_turn("login");
        for _ in 0..4 {
            s.record(&ActionItem::click(10, 10), true);
            s.record(&ActionItem::type_text("user"), true);
        }

        let prepared = s.prepare(&ActionItem::click(20, 30));
        // The trailing "type_short->click_region_0_0" pair predicts 1.0 * 0.8,
        // backed by the 4/4 "click_region_0_0->type_short" pattern
        let advisory = prepared.advisory.expect("advisory");
        assert_eq!(advisory.pattern, "click_region_0_0->type_short");
        assert!((advisory.probability - 0.8).abs() < 1e-9);
        assert!(advisory.success_rate > 0.8);
    }

    #[test]
    fn test_echo_disabled() {
        let mut s = session();
        for _ in 0..4 {
            s.record(&ActionItem::click(10, 10), true);
            s.record(&ActionItem::type_text("user"), true);
        }
        s.set_echo_enabled(false);

        assert!(s.record(&ActionItem::click(10, 10), true).advisory.is_none());
        s.set_echo_enabled(true);
        s.set_echo_threshold(1.0);
        assert!(s.record(&ActionItem::type_text("u"), true).advisory.is_none());
    }

    #[test]
    fn test_threshold_clamped() {
        let mut s = session();
        s.set_echo_threshold(3.0);
        assert_eq!(s.settings().echo_threshold, 1.0);
        s.set_echo_threshold(-1.0);
        assert_eq!(s.settings().echo_threshold, 0.0);
    }

    #[test]
    fn test_nan_threshold_keeps_gate_closed() {
        let settings = SessionSettings {
            echo_threshold: f64::NAN,
            ..SessionSettings::default()
        };
        let mut s = EchoSession::new(Uuid::new_v4(), settings);
        assert_eq!(s.settings().echo_threshold, crate::DEFAULT_ECHO_THRESHOLD);

        for _ in 0..4 {
            s.record(&ActionItem::click(10, 10), true);
            s.record(&ActionItem::type_text("user"), true);
        }
        s.record(&ActionItem::scroll(1), true);
        s.record(&ActionItem::type_text("user"), false);
        s.record(&ActionItem::scroll(1), true);

        // "scroll_down->type_short" only ever failed, so typing now predicts
        // 0.0 even though "click_region_0_0->type_short" is a proven pattern
        s.set_echo_threshold(f64::NAN);
        assert_eq!(s.settings().echo_threshold, crate::DEFAULT_ECHO_THRESHOLD);
        assert!(s.record(&ActionItem::type_text("user"), true).advisory.is_none());

        s.set_echo_threshold(f64::INFINITY);
        assert_eq!(s.settings().echo_threshold, crate::DEFAULT_ECHO_THRESHOLD);
    }

    #[test]
    fn test_end_turn_insight_and_autosave() {
        let mut s = session();
        assert!(s.end_turn().insight.is_none());

        for _ in 0..5 {
            s.record(&ActionItem::scroll(5), false);
        }
        // Every observed pair failed: scroll_down->scroll_down predicts 0.0,
        // so the last three actions fall back to a failing suffix
        let report = s.end_turn();
        assert!(matches!(report.insight, Some(TurnInsight::LowSuccess { .. })));
        assert!(!report.autosave_due);

        for _ in 0..5 {
            s.record(&ActionItem::scroll(5), false);
        }
        assert!(s.end_turn().autosave_due);
    }

    #[test]
    fn test_summary() {
        let mut s = session();
        s.begin_turn("x");
        for _ in 0..3 {
            s.record(&ActionItem::click(0, 0), true);
        }

        let summary = s.summary();
        assert_eq!(summary.tree_size, 3);
        assert_eq!(summary.total_actions, 3);
        assert_eq!(summary.learned_patterns, 1);
        assert!(summary.common_patterns.is_empty());
        assert_eq!(summary.tree_depth, 1);
        assert!(summary.echo_enabled);
    }

    #[test]
    fn test_document_round_trip() {
        let mut s = session();
        s.begin_turn("persist me");
        s.record(&ActionItem::click(1, 1), true);
        s.record(&ActionItem::scroll(-3), false);

        let doc = s.to_document();
        let restored = EchoSession::from_document(Uuid::new_v4(), SessionSettings::default(), Some(&doc));

        assert_eq!(restored.tree().size(), s.tree().size());
        assert_eq!(restored.learner().pattern_count(), 1);
        assert!(restored.action_history().is_empty());
    }

    #[tokio::test]
    async fn test_handle_item_success() {
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .times(2)
            .returning(|_| Ok(ActionOutput::new(vec![json!({"type": "computer_call_output"})])));

        let mut s = session();
        s.begin_turn("go");
        s.handle_item(&ActionItem::click(5, 5), &executor).await.unwrap();
        let (_, recorded) = s.handle_item(&ActionItem::scroll(1), &executor).await.unwrap();

        assert!(recorded.success);
        assert_eq!(recorded.node_success_rate, 1.0);
        let sequence = vec!["click_region_0_0".to_string(), "scroll_down".to_string()];
        assert_eq!(s.predict(&sequence), 1.0);
    }

    #[tokio::test]
    async fn test_handle_item_reported_failure() {
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Ok(ActionOutput::new(vec![json!({"type": "error", "message": "stale element"})])));

        let mut s = session();
        let (_, recorded) = s.handle_item(&ActionItem::click(5, 5), &executor).await.unwrap();

        assert!(!recorded.success);
        assert_eq!(recorded.node_success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_handle_item_execution_error_recorded() {
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .withf(|item| matches!(item, ActionItem::ComputerCall(ComputerAction::Click { .. })))
            .returning(|_| Ok(ActionOutput::default()));
        executor
            .expect_execute()
            .withf(|item| matches!(item, ActionItem::ComputerCall(ComputerAction::Type { .. })))
            .returning(|_| Err(ExecutionError::Unavailable("browser closed".into())));

        let mut s = session();
        s.begin_turn("t");
        s.handle_item(&ActionItem::click(5, 5), &executor).await.unwrap();
        let result = s.handle_item(&ActionItem::type_text("abc"), &executor).await;

        assert!(matches!(result, Err(TreechoError::Execution(_))));
        let node_path = vec![s.current_path()[0].clone(), "type_short".to_string()];
        let node = s.tree().get(&node_path).unwrap();
        assert_eq!(node.total_attempts(), 1);
        assert_eq!(node.successful_attempts(), 0);
        assert_eq!(s.learner().outcomes("click_region_0_0->type_short"), Some(&[false][..]));
    }
}
