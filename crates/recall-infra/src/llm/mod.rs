//! Completion provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `recall-core`, and a factory that builds it from the
//! memory configuration.
//!
//! [`LlmProvider`]: recall_core::llm::provider::LlmProvider

pub mod openai_compat;

use secrecy::SecretString;

use recall_core::llm::box_provider::BoxLlmProvider;
use recall_types::config::MemoryConfig;

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::custom_endpoint;

/// Build the provider used for fact extraction.
pub fn create_extraction_provider(config: &MemoryConfig, api_key: SecretString) -> BoxLlmProvider {
    let oai_config = custom_endpoint(
        api_key,
        &config.extraction_base_url,
        &config.extraction_model,
    );
    BoxLlmProvider::new(OpenAiCompatibleProvider::new(oai_config))
}
