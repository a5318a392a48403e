//! LLM provider abstractions for Recall.
//!
//! This module defines the traits used to reach a text-completion backend:
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch

pub mod box_provider;
pub mod provider;
