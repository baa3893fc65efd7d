//! # Treecho Common
//!
//! Shared types and errors for the Treecho action memory.
//!
//! ## Core Types
//!
//! - [`ActionItem`]: decoded action descriptor handed to the agent loop
//! - [`ComputerAction`]: type-specific payload of a `computer_call`
//! - [`ActionOutput`]: result items returned by the action executor
//! - [`TreechoError`]: unified error type

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ExecutionError, Result, TreechoError};
pub use types::{
    action_item::{ActionItem, ComputerAction, COMPUTER_CALL, FUNCTION_CALL},
    action_output::ActionOutput,
};

/// Treecho version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
