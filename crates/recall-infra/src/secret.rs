//! API key resolution from the environment.
//!
//! The completion API key is read once at startup and held as a
//! [`SecretString`] so it never ends up in logs or `Debug` output.

use secrecy::SecretString;

/// Environment variable holding the completion API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Read a secret from an environment variable.
///
/// Missing, non-Unicode and blank values all count as "not set".
pub fn env_secret(key: &str) -> Option<SecretString> {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => Some(SecretString::from(val.trim().to_string())),
        Ok(_) => None,
        Err(std::env::VarError::NotPresent) => None,
        Err(std::env::VarError::NotUnicode(_)) => {
            tracing::warn!(key, "Environment variable is not valid Unicode; ignoring it");
            None
        }
    }
}

/// The completion API key, if configured.
pub fn resolve_api_key() -> Option<SecretString> {
    env_secret(API_KEY_ENV)
}
