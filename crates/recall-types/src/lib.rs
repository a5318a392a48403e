//! Shared domain types for Recall.
//!
//! This crate contains the domain types of the per-user memory subsystem:
//! user records, exchanges, notes, export documents, configuration, LLM
//! request shapes, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
