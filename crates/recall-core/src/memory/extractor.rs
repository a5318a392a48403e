//! Fact extraction via an external text-completion capability.
//!
//! `FactExtractor` is the collaborator interface: given one finished exchange
//! and the facts already known, return a short list of new facts.
//! `LlmFactExtractor` implements it on top of any `LlmProvider`.
//!
//! `ExtractionBridge` wraps an extractor with the behaviour the rest of the
//! subsystem relies on: a hard timeout, cleanup of the returned strings, and
//! graceful degradation. Any failure is logged as a warning and becomes an
//! empty fact list; the bridge never returns an error to its caller.

use std::time::Duration;

use tracing::{debug, warn};

use recall_types::error::MemoryError;
use recall_types::llm::{CompletionRequest, LlmError, Message};
use recall_types::memory::{Exchange, UserId};

use crate::llm::box_provider::BoxLlmProvider;

/// System prompt for the extraction call.
const EXTRACTION_SYSTEM_PROMPT: &str = "You are a memory manager. Given the conversation below, extract ONLY new \
important facts about the user that would be useful to remember in future \
conversations. Output ONLY a short bullet-point list of new facts \
(name, preferences, interests, location, pets, important events, etc.). \
If there are no new facts worth remembering, output exactly: NONE\n\
Keep it very concise: max 3 bullet points, each under 80 characters.\n\
Do NOT repeat facts already in the existing memory.";

/// Prompt and response are cut to this many characters before extraction.
const MAX_EXCERPT_CHARS: usize = 500;

const EXTRACTION_MAX_TOKENS: u32 = 200;
const EXTRACTION_TEMPERATURE: f64 = 0.3;

/// Collaborator that turns one exchange into candidate facts.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait FactExtractor: Send + Sync + 'static {
    /// Whether calling this extractor can ever produce facts. Disabled
    /// extractors are never scheduled.
    fn is_enabled(&self) -> bool {
        true
    }

    fn extract_facts(
        &self,
        exchange: &Exchange,
        existing_notes: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<String>, LlmError>> + Send;
}

/// Extractor used when no completion backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExtractor;

impl FactExtractor for NoopExtractor {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn extract_facts(
        &self,
        _exchange: &Exchange,
        _existing_notes: &[String],
    ) -> Result<Vec<String>, LlmError> {
        Ok(Vec::new())
    }
}

/// Extracts facts with a single LLM completion call.
pub struct LlmFactExtractor {
    provider: BoxLlmProvider,
    model: String,
}

impl LlmFactExtractor {
    /// `model` may be empty to use the provider's default model.
    pub fn new(provider: BoxLlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn build_request(&self, exchange: &Exchange, existing_notes: &[String]) -> CompletionRequest {
        let existing = if existing_notes.is_empty() {
            "(none)".to_string()
        } else {
            existing_notes
                .iter()
                .map(|n| format!("- {n}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let input = format!(
            "Existing memory:\n{existing}\n\nLatest exchange:\nUser: {}\nAssistant: {}",
            excerpt(&exchange.prompt),
            excerpt(&exchange.response),
        );

        CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(input)],
            system: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            max_tokens: EXTRACTION_MAX_TOKENS,
            temperature: Some(EXTRACTION_TEMPERATURE),
        }
    }
}

impl FactExtractor for LlmFactExtractor {
    #[tracing::instrument(
        name = "extract_memory",
        skip_all,
        fields(
            gen_ai.provider.name = self.provider.name(),
            gen_ai.request.model = %self.model,
            known_notes = existing_notes.len(),
        )
    )]
    async fn extract_facts(
        &self,
        exchange: &Exchange,
        existing_notes: &[String],
    ) -> Result<Vec<String>, LlmError> {
        let request = self.build_request(exchange, existing_notes);
        let response = self.provider.complete(&request).await?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Extraction call finished"
        );
        Ok(parse_fact_lines(&response.content))
    }
}

/// Parse a bullet-list completion into individual facts.
///
/// `NONE` (any case) means no facts. List markers (`-`, `*`, `•`, `1.`, `1)`)
/// are stripped and blank lines skipped.
pub fn parse_fact_lines(content: &str) -> Vec<String> {
    let content = content.trim();
    if content.is_empty() || content.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    content
        .lines()
        .filter_map(|line| {
            let fact = strip_list_marker(line.trim()).trim();
            if fact.is_empty() || fact.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(fact.to_string())
            }
        })
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(&['-', '*', '•'][..]) {
        return rest;
    }
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(&['.', ')'][..]) {
            return rest;
        }
    }
    line
}

fn excerpt(text: &str) -> String {
    text.chars().take(MAX_EXCERPT_CHARS).collect()
}

/// Timeout, cleanup and failure absorption around a `FactExtractor`.
pub struct ExtractionBridge<E: FactExtractor> {
    extractor: E,
    timeout: Duration,
}

impl<E: FactExtractor> ExtractionBridge<E> {
    pub fn new(extractor: E, timeout: Duration) -> Self {
        Self { extractor, timeout }
    }

    pub fn is_enabled(&self) -> bool {
        self.extractor.is_enabled()
    }

    /// Run extraction and return cleaned, previously unknown facts.
    ///
    /// Never fails: errors and timeouts are logged and yield an empty list.
    pub async fn extract(
        &self,
        user_id: &UserId,
        exchange: &Exchange,
        existing_notes: &[String],
    ) -> Vec<String> {
        match self.try_extract(exchange, existing_notes).await {
            Ok(facts) => {
                let facts = clean_facts(facts, existing_notes);
                debug!(%user_id, count = facts.len(), "Extracted facts");
                facts
            }
            Err(e) => {
                warn!(%user_id, operation = "extract", error = %e, "Memory extraction failed; treating as no facts");
                Vec::new()
            }
        }
    }

    async fn try_extract(
        &self,
        exchange: &Exchange,
        existing_notes: &[String],
    ) -> Result<Vec<String>, MemoryError> {
        match tokio::time::timeout(
            self.timeout,
            self.extractor.extract_facts(exchange, existing_notes),
        )
        .await
        {
            Ok(Ok(facts)) => Ok(facts),
            Ok(Err(e)) => Err(MemoryError::ExtractionFailure(e.to_string())),
            Err(_) => Err(MemoryError::ExtractionFailure(
                LlmError::Timeout(self.timeout.as_secs()).to_string(),
            )),
        }
    }
}

/// Trim, then drop empty strings, duplicates, and facts already known.
fn clean_facts(facts: Vec<String>, existing_notes: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(facts.len());
    for fact in facts {
        let fact = fact.trim();
        if fact.is_empty()
            || existing_notes.iter().any(|n| n == fact)
            || cleaned.iter().any(|c| c == fact)
        {
            continue;
        }
        cleaned.push(fact.to_string());
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::LlmProvider;
    use recall_types::llm::{CompletionResponse, StopReason, Usage};
    use std::sync::{Arc, Mutex};

    struct ScriptedProvider {
        reply: Result<String, ()>,
        seen: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(content) => Ok(CompletionResponse {
                    id: "r1".to_string(),
                    content: content.clone(),
                    model: "tiny".to_string(),
                    stop_reason: StopReason::EndTurn,
                    usage: Usage::default(),
                }),
                Err(()) => Err(LlmError::QuotaExhausted("out of credits".to_string())),
            }
        }
    }

    fn scripted(reply: Result<&str, ()>) -> (LlmFactExtractor, Arc<Mutex<Vec<CompletionRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = ScriptedProvider {
            reply: reply.map(str::to_string),
            seen: Arc::clone(&seen),
        };
        (
            LlmFactExtractor::new(BoxLlmProvider::new(provider), "gpt-4.1-nano"),
            seen,
        )
    }

    struct SlowExtractor;

    impl FactExtractor for SlowExtractor {
        async fn extract_facts(
            &self,
            _exchange: &Exchange,
            _existing_notes: &[String],
        ) -> Result<Vec<String>, LlmError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec!["never".to_string()])
        }
    }

    #[test]
    fn test_parse_fact_lines_bullets() {
        let facts = parse_fact_lines("- Name is Ana\n* Has a cat\n• Lives in Porto\n2. Likes jazz\n\n");
        assert_eq!(
            facts,
            vec!["Name is Ana", "Has a cat", "Lives in Porto", "Likes jazz"]
        );
    }

    #[test]
    fn test_parse_fact_lines_none() {
        assert!(parse_fact_lines("NONE").is_empty());
        assert!(parse_fact_lines("  none \n").is_empty());
        assert!(parse_fact_lines("").is_empty());
    }

    #[test]
    fn test_strip_list_marker_keeps_plain_numbers() {
        assert_eq!(strip_list_marker("42 is the answer"), "42 is the answer");
        assert_eq!(strip_list_marker("3) Plays chess"), " Plays chess");
    }

    #[test]
    fn test_clean_facts_drops_known_and_duplicates() {
        let existing = vec!["Has a cat".to_string()];
        let cleaned = clean_facts(
            vec![
                "  Has a cat ".to_string(),
                "Likes jazz".to_string(),
                "Likes jazz".to_string(),
                "   ".to_string(),
            ],
            &existing,
        );
        assert_eq!(cleaned, vec!["Likes jazz"]);
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(600);
        assert_eq!(excerpt(&long).chars().count(), MAX_EXCERPT_CHARS);
    }

    #[tokio::test]
    async fn test_llm_extractor_builds_request() {
        let (extractor, seen) = scripted(Ok("- Name is Ana"));
        let exchange = Exchange::new("I'm Ana", "Nice to meet you, Ana");
        let facts = extractor
            .extract_facts(&exchange, &["Has a cat".to_string()])
            .await
            .unwrap();
        assert_eq!(facts, vec!["Name is Ana"]);

        let requests = seen.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.model, "gpt-4.1-nano");
        assert_eq!(request.max_tokens, 200);
        assert_eq!(request.temperature, Some(0.3));
        assert!(request.system.as_deref().unwrap().contains("NONE"));
        assert!(request.messages[0].content.contains("- Has a cat"));
        assert!(request.messages[0].content.contains("User: I'm Ana"));
    }

    #[tokio::test]
    async fn test_bridge_maps_provider_error_to_empty() {
        let (extractor, _) = scripted(Err(()));
        let bridge = ExtractionBridge::new(extractor, Duration::from_secs(5));
        let facts = bridge
            .extract(&UserId::from("1"), &Exchange::new("a", "b"), &[])
            .await;
        assert!(facts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_times_out() {
        let bridge = ExtractionBridge::new(SlowExtractor, Duration::from_secs(1));
        let facts = bridge
            .extract(&UserId::from("1"), &Exchange::new("a", "b"), &[])
            .await;
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn test_bridge_filters_known_notes() {
        let (extractor, _) = scripted(Ok("- Has a cat\n- Name is Ana"));
        let bridge = ExtractionBridge::new(extractor, Duration::from_secs(5));
        let facts = bridge
            .extract(
                &UserId::from("1"),
                &Exchange::new("a", "b"),
                &["Has a cat".to_string()],
            )
            .await;
        assert_eq!(facts, vec!["Name is Ana"]);
    }

    #[test]
    fn test_noop_extractor_is_disabled() {
        assert!(!NoopExtractor.is_enabled());
    }
}
