//! Configuration and defaults for OpenAI-compatible providers.

use secrecy::SecretString;

/// Official OpenAI endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for an OpenAI-compatible completion provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "openai").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    pub base_url: String,
    /// API key for authentication.
    pub api_key: SecretString,
    /// Model identifier (e.g., "gpt-4.1-nano").
    pub model: String,
}

/// OpenAI default configuration.
pub fn openai_defaults(api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: OPENAI_BASE_URL.into(),
        api_key,
        model: model.into(),
    }
}

/// Configuration for a self-hosted or third-party endpoint that speaks the
/// OpenAI chat completions protocol.
///
/// Anything other than the official endpoint is reported under the name
/// "openai-compatible".
pub fn custom_endpoint(api_key: SecretString, base_url: &str, model: &str) -> OpenAiCompatConfig {
    let base_url = base_url.trim_end_matches('/');
    let provider_name = if base_url == OPENAI_BASE_URL {
        "openai"
    } else {
        "openai-compatible"
    };
    OpenAiCompatConfig {
        provider_name: provider_name.into(),
        base_url: base_url.into(),
        api_key,
        model: model.into(),
    }
}
