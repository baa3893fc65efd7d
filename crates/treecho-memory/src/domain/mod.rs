//! Treecho domain logic
//!
//! Action normalization, the interaction tree, sequence learning, echo
//! advisories and the session that ties them together.

pub mod action_key;
pub mod advisor;
pub mod learner;
pub mod session;
pub mod summary;
pub mod tree;
