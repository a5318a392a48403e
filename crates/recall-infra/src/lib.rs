//! Infrastructure layer for Recall.
//!
//! Contains implementations of the traits defined in `recall-core`: the JSON
//! file store, the OpenAI-compatible completion provider, plus the config
//! loader and environment-based API key resolution.

pub mod config;
pub mod filesystem;
pub mod llm;
pub mod secret;
