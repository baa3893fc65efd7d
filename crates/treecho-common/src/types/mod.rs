//! Core data types shared across Treecho crates

pub mod action_item;
pub mod action_output;
