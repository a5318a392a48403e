//! Memory logic and port traits for Recall.
//!
//! This crate defines the "ports" (`LlmProvider`, `FactExtractor`,
//! `MemoryPersistence`) that the infrastructure layer implements. It depends
//! only on `recall-types`, never on `recall-infra` or any IO crate.

pub mod llm;
pub mod memory;
