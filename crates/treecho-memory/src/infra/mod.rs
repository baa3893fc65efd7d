//! Treecho infrastructure
//!
//! Document encoding and storage backends for session persistence.

pub mod codec;
pub mod session_store;
