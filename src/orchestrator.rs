//! Top-level wiring: one coordinator, one cache, the batch and chunk
//! processors, and the isolated worker, built from a single configuration.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::batch::{ProgressObserver, VocabularyBatchProcessor, VocabularyRequest};
use crate::cache::CacheStore;
use crate::config::OrchestratorConfig;
use crate::error::{AiError, BatchError, Result, WorkerError};
use crate::llm::{self, FallbackCoordinator, ProviderPair};
use crate::pipeline::{
    ArtifactService, Chunk, ChunkObserver, ChunkProcessor, ChunkRunReport, ChunkTaskOptions,
    candidate_words,
};
use crate::task::{LanguageDetection, SummaryLength, TaskOutput, TaskPayload, VocabularyItem};
use crate::worker::{InProcessHost, ResponseReceiver, SandboxHost, WorkerLifecycleManager};

/// Words shorter than this are not offered for vocabulary analysis.
const MIN_VOCABULARY_CHARS: usize = 4;
const MAX_VOCABULARY_WORDS: usize = 60;

/// Learning artifacts for one text.
#[derive(Debug, Clone, Serialize)]
pub struct TextAnalysis {
    pub language: LanguageDetection,
    pub summary: String,
    pub rewrite: String,
    pub vocabulary: Vec<VocabularyItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vocabulary_errors: Vec<BatchError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    /// Artifacts served from the cache rather than a provider.
    pub cache_hits: usize,
}

pub struct LearningOrchestrator {
    config: OrchestratorConfig,
    coordinator: Arc<FallbackCoordinator>,
    artifacts: Arc<ArtifactService>,
    vocabulary: VocabularyBatchProcessor,
    chunks: ChunkProcessor,
    worker: WorkerLifecycleManager,
}

impl LearningOrchestrator {
    /// Build providers from configuration, with an in-memory cache and the
    /// in-process worker host. Must be called inside a tokio runtime.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        let providers = llm::create_providers(&config.providers).map_err(AiError::from)?;
        Ok(Self::with_providers(config, providers))
    }

    /// Wire an explicit provider pair. Must be called inside a tokio runtime.
    pub fn with_providers(config: OrchestratorConfig, providers: ProviderPair) -> Self {
        let coordinator = Arc::new(llm::create_coordinator(providers, &config));
        let cache = Arc::new(CacheStore::in_memory(&config.cache));
        let (host, responses) = InProcessHost::new(Arc::clone(&coordinator));
        Self::from_parts(config, coordinator, cache, host, responses)
    }

    /// Wire caller-supplied parts, e.g. a persistent cache or another host.
    pub fn from_parts(
        config: OrchestratorConfig,
        coordinator: Arc<FallbackCoordinator>,
        cache: Arc<CacheStore>,
        host: Arc<dyn SandboxHost>,
        responses: ResponseReceiver,
    ) -> Self {
        let artifacts = Arc::new(ArtifactService::new(Arc::clone(&coordinator), cache));
        let vocabulary = VocabularyBatchProcessor::new(Arc::clone(&coordinator), config.batch.clone());
        let chunks = ChunkProcessor::new(Arc::clone(&artifacts), config.batch.clone());
        let worker = WorkerLifecycleManager::new(host, responses, config.worker.clone());
        Self {
            config,
            coordinator,
            artifacts,
            vocabulary,
            chunks,
            worker,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<FallbackCoordinator> {
        &self.coordinator
    }

    pub fn artifacts(&self) -> &Arc<ArtifactService> {
        &self.artifacts
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.artifacts.cache()
    }

    pub fn vocabulary(&self) -> &VocabularyBatchProcessor {
        &self.vocabulary
    }

    pub fn worker(&self) -> &WorkerLifecycleManager {
        &self.worker
    }

    /// Detect, summarize, rewrite and extract vocabulary for `text`, and
    /// translate it when a target language is configured.
    ///
    /// Vocabulary batches that fail are reported in `vocabulary_errors`; the
    /// other artifacts fail the call.
    pub async fn analyze_text(
        &self,
        text: &str,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<TextAnalysis> {
        let learner = &self.config.learner;
        let language = self.artifacts.detect_language(text).await?;
        let source = language.value.language.as_str();
        info!(language = source, confidence = language.value.confidence, "Detected language");

        let (summary, rewrite) = futures::try_join!(
            self.artifacts.summarize(text, SummaryLength::Medium),
            self.artifacts.rewrite(text, learner.difficulty),
        )?;

        let words = candidate_words(text, MIN_VOCABULARY_CHARS, MAX_VOCABULARY_WORDS);
        let vocabulary = self
            .vocabulary
            .process(
                VocabularyRequest {
                    words: &words,
                    language: source,
                    target_language: learner.target_language.as_deref(),
                },
                observer,
            )
            .await;

        let translation = match learner.target_language.as_deref() {
            Some(target) => Some(self.artifacts.translate(text, source, target).await?),
            None => None,
        };

        let cache_hits = [language.hit, summary.hit, rewrite.hit]
            .into_iter()
            .chain(translation.as_ref().map(|t| t.hit))
            .filter(|hit| *hit)
            .count();

        info!(
            words = vocabulary.items.len(),
            failed_batches = vocabulary.errors.len(),
            cache_hits,
            "Text analysis complete"
        );

        Ok(TextAnalysis {
            language: language.value,
            summary: summary.value,
            rewrite: rewrite.value,
            vocabulary: vocabulary.items,
            vocabulary_errors: vocabulary.errors,
            translation: translation.map(|t| t.value),
            cache_hits,
        })
    }

    /// Fill `chunks` in place with summaries, rewrites and vocabulary.
    /// `language` is the language the chunks are written in.
    pub async fn process_chunks(
        &self,
        chunks: &mut [Chunk],
        language: &str,
        observer: Option<&dyn ChunkObserver>,
    ) -> ChunkRunReport {
        let options = ChunkTaskOptions {
            difficulty: self.config.learner.difficulty,
            language: language.to_string(),
            ..ChunkTaskOptions::default()
        };
        self.chunks.process(chunks, &options, observer).await
    }

    /// Run one task inside the isolated worker context.
    pub async fn execute_isolated(
        &self,
        payload: &TaskPayload,
    ) -> std::result::Result<TaskOutput, WorkerError> {
        self.worker.execute(payload).await
    }

    /// Cancel pending isolated work and tear the context down.
    pub async fn shutdown(&self) {
        self.worker.close_context().await;
    }
}
