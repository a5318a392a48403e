//! Per-user conversational memory.
//!
//! A bounded rolling history of recent exchanges plus a set of long-term
//! notes per user. `store` holds the records, `prune` evicts old notes,
//! `extractor` turns finished exchanges into new notes, `transfer` handles
//! export and validated import, and `service` ties them together with
//! debounced persistence behind the `MemoryPersistence` trait.

pub mod extractor;
pub mod persistence;
pub mod prune;
pub mod service;
pub mod store;
pub mod transfer;
