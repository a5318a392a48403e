//! LlmProvider trait definition.
//!
//! This is the abstraction every text-completion backend implements. Uses
//! RPITIT for `complete`; the `BoxLlmProvider` wrapper restores object safety.

use recall_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM provider backends (OpenAI and OpenAI-compatible endpoints).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in recall-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
