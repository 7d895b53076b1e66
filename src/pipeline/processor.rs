//! Progressive chunk processor.
//!
//! Every chunk gets a summary, a difficulty-adjusted rewrite and a vocabulary
//! analysis. Chunks run concurrently; each provider-bound operation holds a
//! limiter slot, so at most `max_concurrency` operations are in flight across
//! the whole run. The cache is consulted before every operation.
//!
//! A chunk is marked processed, with artifacts attached, only when all three
//! operations succeed. A failed chunk is logged and left untouched; its
//! siblings are not affected.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use super::artifacts::{ArtifactService, Cached};
use super::chunk::{Chunk, ChunkArtifacts, candidate_words};
use crate::batch::ConcurrencyLimiter;
use crate::config::BatchConfig;
use crate::error::{AiError, CompoundError};
use crate::task::{Difficulty, SummaryLength};

/// Shortest word considered for chunk vocabulary.
const MIN_VOCABULARY_WORD_CHARS: usize = 5;

/// Per-run settings for chunk processing.
#[derive(Debug, Clone)]
pub struct ChunkTaskOptions {
    pub summary_length: SummaryLength,
    pub difficulty: Difficulty,
    /// Language of the content, used for vocabulary analysis.
    pub language: String,
    /// Candidate words analyzed per chunk.
    pub vocabulary_words: usize,
}

impl Default for ChunkTaskOptions {
    fn default() -> Self {
        Self {
            summary_length: SummaryLength::Short,
            difficulty: Difficulty::Intermediate,
            language: "en".to_string(),
            vocabulary_words: 8,
        }
    }
}

/// Emitted after each chunk finishes, successfully or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkProgress {
    pub completed: usize,
    pub total: usize,
    pub chunk_order: usize,
    pub succeeded: bool,
}

pub trait ChunkObserver: Send + Sync {
    fn on_chunk(&self, progress: &ChunkProgress);
}

impl<F> ChunkObserver for F
where
    F: Fn(&ChunkProgress) + Send + Sync,
{
    fn on_chunk(&self, progress: &ChunkProgress) {
        self(progress)
    }
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkRunReport {
    pub processed: usize,
    pub failed: usize,
    /// Operations answered from the cache.
    pub cache_hits: usize,
    /// Chunks already processed before the run, left alone.
    pub skipped: usize,
}

pub struct ChunkProcessor {
    artifacts: Arc<ArtifactService>,
    config: BatchConfig,
}

impl ChunkProcessor {
    pub fn new(artifacts: Arc<ArtifactService>, config: BatchConfig) -> Self {
        Self { artifacts, config }
    }

    /// Process `chunks` in place.
    pub async fn process(
        &self,
        chunks: &mut [Chunk],
        options: &ChunkTaskOptions,
        observer: Option<&dyn ChunkObserver>,
    ) -> ChunkRunReport {
        let limiter = ConcurrencyLimiter::new(self.config.max_concurrency);
        let total = chunks.len();
        let completed = AtomicUsize::new(0);
        let cache_hits = AtomicUsize::new(0);

        let skipped = chunks.iter().filter(|c| c.processed).count();
        info!(
            chunks = total,
            skipped,
            max_concurrency = limiter.max_concurrency(),
            "Starting chunk processing"
        );

        let runs = chunks
            .iter_mut()
            .filter(|chunk| !chunk.processed)
            .map(|chunk| {
                let limiter = &limiter;
                let completed = &completed;
                let cache_hits = &cache_hits;
                async move {
                    let result = self.process_chunk(chunk, options, limiter).await;
                    let succeeded = match result {
                        Ok((artifacts, hits)) => {
                            chunk.artifacts = artifacts;
                            chunk.processed = true;
                            cache_hits.fetch_add(hits, Ordering::SeqCst);
                            true
                        }
                        Err(e) => {
                            warn!(
                                chunk = chunk.order,
                                kind = %e.kind(),
                                error = %e,
                                "Chunk processing failed"
                            );
                            false
                        }
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(observer) = observer {
                        observer.on_chunk(&ChunkProgress {
                            completed: done,
                            total: total - skipped,
                            chunk_order: chunk.order,
                            succeeded,
                        });
                    }
                    succeeded
                }
            });

        let outcomes = join_all(runs).await;
        let processed = outcomes.iter().filter(|ok| **ok).count();
        let report = ChunkRunReport {
            processed,
            failed: outcomes.len() - processed,
            cache_hits: cache_hits.load(Ordering::SeqCst),
            skipped,
        };
        info!(
            processed = report.processed,
            failed = report.failed,
            cache_hits = report.cache_hits,
            "Chunk processing complete"
        );
        report
    }

    /// Run the three operations for one chunk. Returns the artifacts and the
    /// number of cache hits.
    async fn process_chunk(
        &self,
        chunk: &Chunk,
        options: &ChunkTaskOptions,
        limiter: &ConcurrencyLimiter,
    ) -> Result<(ChunkArtifacts, usize), AiError> {
        let text = chunk.content.as_str();
        let words = candidate_words(text, MIN_VOCABULARY_WORD_CHARS, options.vocabulary_words);

        let summary = gated(limiter, self.artifacts.summarize(text, options.summary_length));
        let rewrite = gated(limiter, self.artifacts.rewrite(text, options.difficulty));
        let vocabulary = async {
            if words.is_empty() {
                return Ok(Cached {
                    value: Vec::new(),
                    hit: false,
                });
            }
            gated(limiter, self.artifacts.vocabulary(text, &words, &options.language)).await
        };

        let (summary, rewrite, vocabulary) = futures::try_join!(summary, rewrite, vocabulary)?;
        let hits = [summary.hit, rewrite.hit, vocabulary.hit]
            .iter()
            .filter(|hit| **hit)
            .count();

        Ok((
            ChunkArtifacts {
                summary: Some(summary.value),
                rewrite: Some(rewrite.value),
                vocabulary: vocabulary.value,
            },
            hits,
        ))
    }
}

/// Run `operation` under a limiter slot. A closed limiter reads as "no provider".
async fn gated<T>(
    limiter: &ConcurrencyLimiter,
    operation: impl std::future::Future<Output = Result<T, AiError>>,
) -> Result<T, AiError> {
    match limiter.run(operation).await {
        Some(result) => result,
        None => Err(AiError::Compound(CompoundError::new(Vec::new()))),
    }
}
