//! Application state wiring the memory service together.
//!
//! `MemoryService` is generic over its persistence and extractor traits;
//! AppState pins it to the JSON file store and to whichever extractor the
//! environment allows.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use recall_core::memory::extractor::{FactExtractor, LlmFactExtractor, NoopExtractor};
use recall_core::memory::service::MemoryService;
use recall_infra::config::load_memory_config;
use recall_infra::filesystem::json_store::JsonFileStore;
use recall_infra::filesystem::resolve_data_dir;
use recall_infra::llm::create_extraction_provider;
use recall_infra::secret::{API_KEY_ENV, resolve_api_key};
use recall_types::config::MemoryConfig;
use recall_types::llm::LlmError;
use recall_types::memory::Exchange;

/// Extractor chosen at startup: the completion-backed one when an API key
/// is present, a disabled one otherwise.
pub enum ConfiguredExtractor {
    Llm(LlmFactExtractor),
    Disabled(NoopExtractor),
}

impl ConfiguredExtractor {
    pub fn from_env(config: &MemoryConfig) -> Self {
        match resolve_api_key() {
            Some(api_key) => {
                let provider = create_extraction_provider(config, api_key);
                info!(
                    provider = provider.name(),
                    model = %config.extraction_model,
                    "Fact extraction enabled"
                );
                Self::Llm(LlmFactExtractor::new(
                    provider,
                    config.extraction_model.clone(),
                ))
            }
            None => {
                info!("{API_KEY_ENV} not set; fact extraction disabled");
                Self::Disabled(NoopExtractor)
            }
        }
    }
}

impl FactExtractor for ConfiguredExtractor {
    fn is_enabled(&self) -> bool {
        match self {
            Self::Llm(extractor) => extractor.is_enabled(),
            Self::Disabled(extractor) => extractor.is_enabled(),
        }
    }

    async fn extract_facts(
        &self,
        exchange: &Exchange,
        existing_notes: &[String],
    ) -> Result<Vec<String>, LlmError> {
        match self {
            Self::Llm(extractor) => extractor.extract_facts(exchange, existing_notes).await,
            Self::Disabled(extractor) => extractor.extract_facts(exchange, existing_notes).await,
        }
    }
}

/// Concrete service type pinned to infra implementations.
pub type ConcreteMemoryService = MemoryService<JsonFileStore, ConfiguredExtractor>;

/// Shared application state used by the CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub memory: Arc<ConcreteMemoryService>,
}

impl AppState {
    /// Resolve the data directory, load config and open the memory service.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);

        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = load_memory_config(&data_dir).await;
        let store = JsonFileStore::in_dir(&data_dir, &config.memory_file);
        let extractor = ConfiguredExtractor::from_env(&config);

        let memory = MemoryService::open(store, extractor, config).await;

        Ok(Self {
            memory: Arc::new(memory),
        })
    }

    /// Wait for background fact extraction to finish.
    pub async fn drain_extractions(&self) {
        if !self.memory.drain_extractions().await {
            warn!("Fact extraction still running; new notes may be missing");
        }
    }

    /// Drain extraction jobs and flush pending changes to disk.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.memory
            .shutdown()
            .await
            .context("Failed to save memory store")
    }
}
