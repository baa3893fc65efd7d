//! # Treecho
//!
//! Interaction memory for action-taking agents.
//!
//! Treecho sits in an agent's action loop and learns from every action the
//! agent takes. Each action is normalized to a coarse key and filed in an
//! interaction tree under the context of the current turn, while pairs of
//! consecutive keys feed a sequence pattern learner. Before an action runs,
//! the echo advisor checks whether similar sequences reliably succeeded and
//! surfaces an advisory.
//!
//! ## Key Concepts
//!
//! - **Action Key**: Coarse category of an action (`click_region_3_1`, `type_short`)
//! - **Interaction Tree**: Per-context success statistics, created lazily
//! - **Sequence Learner**: Outcome lists per key signature (`a->b`)
//! - **Echo Advisory**: A hint that the upcoming action matches a proven pattern
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     EchoService                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐     │
//! │  │   Record    │  │   Predict   │  │  Summary    │     │
//! │  │   Action    │  │  Sequence   │  │  & Turns    │     │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘     │
//! │         │                │                │            │
//! │  ┌──────┴────────────────┴────────────────┴──────┐     │
//! │  │                EchoSession                    │     │
//! │  │  (InteractionTree + SequencePatternLearner)   │     │
//! │  └──────────────────────┬────────────────────────┘     │
//! │                         │                              │
//! │  ┌──────────────────────┴────────────────────────┐     │
//! │  │              SessionStore                      │     │
//! │  │  (One JSON document per session)              │     │
//! │  └───────────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod domain;
pub mod infra;
pub mod service;

// Re-export core types
pub use domain::action_key::{normalize, ActionKey};
pub use domain::advisor::{Advisory, EchoAdvisor};
pub use domain::learner::{CommonPattern, SequencePatternLearner};
pub use domain::session::{ActionExecutor, EchoSession, RecordedAction, SessionSettings};
pub use domain::summary::{SessionSummary, TurnInsight, TurnReport};
pub use domain::tree::{InteractionTree, NodeContext, TreeNode};

// Re-export service
pub use service::EchoService;

// Re-export infrastructure
pub use infra::codec::PersistenceCodec;
pub use infra::session_store::{FileSessionStore, InMemorySessionStore, SessionStore, StoreError};

/// Treecho version
pub const TREECHO_VERSION: &str = "0.1.0";

/// Default prediction an advisory must exceed
pub const DEFAULT_ECHO_THRESHOLD: f64 = 0.7;

/// Default soft tree depth reported in summaries
pub const DEFAULT_MAX_TREE_DEPTH: usize = 10;

/// Default autosave cadence, in recorded actions
pub const DEFAULT_AUTOSAVE_EVERY: usize = 10;
