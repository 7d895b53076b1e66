//! Vocabulary batch processing.
//!
//! Words are deduplicated, split into fixed-size batches and run through the
//! fallback coordinator with at most `max_concurrency` batches in flight.
//! Each batch analyzes and translates its words concurrently, under the
//! batch-level retry policy. That policy is the only retry layer for batches:
//! the coordinator view used here makes one attempt per provider. A failed
//! batch becomes a [`BatchError`] in the outcome; its siblings keep going.
//! So does a batch that never got a slot because the limiter closed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use super::limiter::ConcurrencyLimiter;
use crate::config::BatchConfig;
use crate::error::{AiError, BatchError, CompoundError};
use crate::llm::FallbackCoordinator;
use crate::retry::{RetryPolicy, execute_with_retry};
use crate::task::VocabularyItem;

/// Progress after a batch finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    /// Words processed so far, failed batches included.
    pub completed: usize,
    pub total: usize,
    /// 1-based index of the batch that just finished.
    pub current_batch: usize,
    pub total_batches: usize,
    /// Failures recorded so far.
    pub errors: Vec<BatchError>,
}

/// Receives progress reports. Passed per call; nothing is retained.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &BatchProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&BatchProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &BatchProgress) {
        self(progress)
    }
}

/// Result of one vocabulary run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VocabularyBatchOutcome {
    /// Analyzed words, in input order.
    pub items: Vec<VocabularyItem>,
    pub errors: Vec<BatchError>,
    pub batches: usize,
    /// Most batches observed in flight at once.
    pub peak_concurrency: usize,
}

/// One vocabulary run's inputs.
#[derive(Debug, Clone)]
pub struct VocabularyRequest<'a> {
    pub words: &'a [String],
    /// Language of the words.
    pub language: &'a str,
    /// Translate each word into this language, if set.
    pub target_language: Option<&'a str>,
}

/// Runs vocabulary analysis in concurrency-bounded batches.
pub struct VocabularyBatchProcessor {
    coordinator: Arc<FallbackCoordinator>,
    config: BatchConfig,
}

impl VocabularyBatchProcessor {
    pub fn new(coordinator: Arc<FallbackCoordinator>, config: BatchConfig) -> Self {
        let coordinator = Arc::new(coordinator.with_retry_policy(RetryPolicy::none()));
        Self { coordinator, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub async fn process(
        &self,
        request: VocabularyRequest<'_>,
        observer: Option<&dyn ProgressObserver>,
    ) -> VocabularyBatchOutcome {
        let limiter = ConcurrencyLimiter::new(self.config.max_concurrency);
        self.process_limited(request, observer, &limiter).await
    }

    async fn process_limited(
        &self,
        request: VocabularyRequest<'_>,
        observer: Option<&dyn ProgressObserver>,
        limiter: &ConcurrencyLimiter,
    ) -> VocabularyBatchOutcome {
        let words = dedupe_words(request.words);
        if words.is_empty() {
            return VocabularyBatchOutcome::default();
        }

        let batch_size = self.config.batch_size.max(1);
        let batches: Vec<&[String]> = words.chunks(batch_size).collect();
        let total_batches = batches.len();
        let retry = self.config.retry_policy();
        let translate_to = request
            .target_language
            .filter(|to| !to.eq_ignore_ascii_case(request.language));

        info!(
            words = words.len(),
            batches = total_batches,
            max_concurrency = limiter.max_concurrency(),
            language = request.language,
            "Starting vocabulary batch run"
        );

        let progress = Mutex::new(BatchProgress {
            completed: 0,
            total: words.len(),
            current_batch: 0,
            total_batches,
            errors: Vec::new(),
        });

        let language = request.language;
        let runs = batches.iter().enumerate().map(|(index, batch)| {
            let batch: &[String] = batch;
            let progress = &progress;
            let retry = &retry;
            async move {
                let result = limiter
                    .run(self.run_batch(batch, language, translate_to, retry))
                    .await
                    .unwrap_or_else(|| Err(AiError::Compound(CompoundError::new(Vec::new()))));

                let failure = result
                    .as_ref()
                    .err()
                    .map(|err| BatchError::from_ai(index, batch, err));
                if let Some(failure) = &failure {
                    warn!(
                        batch = index + 1,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Vocabulary batch failed"
                    );
                }
                report(progress, batch.len(), index, failure, observer);
                result.unwrap_or_default()
            }
        });

        let results = join_all(runs).await;
        let errors = progress
            .into_inner()
            .map(|p| p.errors)
            .unwrap_or_else(|poisoned| poisoned.into_inner().errors);

        let items: Vec<VocabularyItem> = results.into_iter().flatten().collect();
        info!(
            items = items.len(),
            failed_batches = errors.len(),
            "Vocabulary batch run complete"
        );

        VocabularyBatchOutcome {
            items,
            errors: sorted_errors(errors),
            batches: total_batches,
            peak_concurrency: limiter.peak_in_flight(),
        }
    }

    /// Analyze and translate one batch, retrying the pair as a unit.
    async fn run_batch(
        &self,
        batch: &[String],
        language: &str,
        translate_to: Option<&str>,
        retry: &RetryPolicy,
    ) -> Result<Vec<VocabularyItem>, AiError> {
        execute_with_retry(
            || async move {
                let analysis = self.coordinator.analyze_vocabulary(batch, language);
                let translation = async {
                    match translate_to {
                        Some(to) => self
                            .coordinator
                            .translate_batch(batch, language, to)
                            .await
                            .map(Some),
                        None => Ok(None),
                    }
                };
                let (items, translations) = futures::try_join!(analysis, translation)?;
                Ok::<_, AiError>(merge_batch(batch, items, translations))
            },
            retry,
        )
        .await
        .into_result()
    }
}

fn report(
    progress: &Mutex<BatchProgress>,
    words: usize,
    index: usize,
    failure: Option<BatchError>,
    observer: Option<&dyn ProgressObserver>,
) {
    let mut progress = match progress.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    progress.completed += words;
    progress.current_batch = index + 1;
    if let Some(failure) = failure {
        progress.errors.push(failure);
    }
    if let Some(observer) = observer {
        observer.on_progress(&progress);
    }
}

fn sorted_errors(mut errors: Vec<BatchError>) -> Vec<BatchError> {
    errors.sort_by_key(|e| e.batch_index);
    errors
}

/// Trim, drop empties and deduplicate case-insensitively, keeping the first
/// spelling seen.
pub fn dedupe_words(words: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .filter(|w| seen.insert(w.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Order analyzed items by their word's position in the batch and attach
/// translations. Items for words outside the batch are kept at the end.
fn merge_batch(
    batch: &[String],
    mut items: Vec<VocabularyItem>,
    translations: Option<Vec<String>>,
) -> Vec<VocabularyItem> {
    let position = |word: &str| {
        batch
            .iter()
            .position(|w| w.to_lowercase() == word.to_lowercase())
            .unwrap_or(usize::MAX)
    };
    items.sort_by_key(|item| position(&item.word));

    if let Some(translations) = translations {
        for item in &mut items {
            let idx = position(&item.word);
            if let Some(translated) = translations.get(idx)
                && !translated.eq_ignore_ascii_case(&batch[idx])
            {
                item.translation = Some(translated.clone());
            }
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::ProviderConfig;
    use crate::error::{ErrorKind, ProviderError};
    use crate::llm::AiProvider;
    use crate::task::{Difficulty, LanguageDetection, SummaryLength};

    /// Fails vocabulary calls with `kind` until `failures` calls have been made.
    struct Scripted {
        failures: usize,
        kind: ErrorKind,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(failures: usize, kind: ErrorKind) -> Arc<Self> {
            Arc::new(Self {
                failures,
                kind,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn detect_language(&self, _: &str) -> Result<LanguageDetection, ProviderError> {
            Err(ProviderError::processing("scripted", "unused"))
        }
        async fn summarize(&self, _: &str, _: SummaryLength) -> Result<String, ProviderError> {
            Err(ProviderError::processing("scripted", "unused"))
        }
        async fn rewrite(&self, _: &str, _: Difficulty) -> Result<String, ProviderError> {
            Err(ProviderError::processing("scripted", "unused"))
        }
        async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, ProviderError> {
            Err(ProviderError::processing("scripted", "unused"))
        }
        async fn analyze_vocabulary(
            &self,
            words: &[String],
            _: &str,
        ) -> Result<Vec<VocabularyItem>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(ProviderError::new("scripted", self.kind, format!("failure {n}")));
            }
            Ok(words.iter().map(|w| item(w)).collect())
        }
    }

    fn processor(provider: Arc<Scripted>, retry_attempts: u32) -> VocabularyBatchProcessor {
        let coordinator = FallbackCoordinator::new(
            Some(provider as Arc<dyn AiProvider>),
            None,
            &ProviderConfig::default(),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                ..RetryPolicy::default()
            },
        );
        VocabularyBatchProcessor::new(
            Arc::new(coordinator),
            BatchConfig {
                batch_size: 2,
                max_concurrency: 2,
                retry_attempts,
                retry_delay: Duration::from_millis(10),
            },
        )
    }

    fn request(words: &[String]) -> VocabularyRequest<'_> {
        VocabularyRequest {
            words,
            language: "es",
            target_language: None,
        }
    }

    fn item(word: &str) -> VocabularyItem {
        VocabularyItem {
            word: word.to_string(),
            definition: format!("meaning of {word}"),
            difficulty: Difficulty::Intermediate,
            part_of_speech: None,
            example: None,
            translation: None,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dedupe_is_case_insensitive_and_keeps_first() {
        let words = strings(&["Casa", "perro", " casa ", "", "PERRO", "gato"]);
        assert_eq!(dedupe_words(&words), strings(&["Casa", "perro", "gato"]));
    }

    #[test]
    fn merge_restores_batch_order_and_translations() {
        let batch = strings(&["uno", "dos", "tres"]);
        let items = vec![item("tres"), item("Uno"), item("dos")];
        let translations = Some(strings(&["one", "dos", "three"]));

        let merged = merge_batch(&batch, items, translations);
        let words: Vec<_> = merged.iter().map(|i| i.word.as_str()).collect();
        assert_eq!(words, vec!["Uno", "dos", "tres"]);
        assert_eq!(merged[0].translation.as_deref(), Some("one"));
        // Untranslated (fallback) items carry no translation.
        assert!(merged[1].translation.is_none());
        assert_eq!(merged[2].translation.as_deref(), Some("three"));
    }

    #[test]
    fn merge_keeps_unknown_words_last() {
        let batch = strings(&["a", "b"]);
        let merged = merge_batch(&batch, vec![item("zzz"), item("b")], None);
        assert_eq!(merged[0].word, "b");
        assert_eq!(merged[1].word, "zzz");
    }

    #[test]
    fn closures_are_observers() {
        let seen = Mutex::new(Vec::new());
        let observer = |p: &BatchProgress| seen.lock().unwrap().push(p.completed);
        let progress = Mutex::new(BatchProgress {
            completed: 0,
            total: 5,
            current_batch: 0,
            total_batches: 2,
            errors: Vec::new(),
        });
        report(&progress, 3, 0, None, Some(&observer));
        report(&progress, 2, 1, None, Some(&observer));
        assert_eq!(*seen.lock().unwrap(), vec![3, 5]);
    }

    #[tokio::test]
    async fn closed_limiter_fails_every_batch() {
        let provider = Scripted::new(0, ErrorKind::Network);
        let processor = processor(provider.clone(), 1);
        let words = strings(&["uno", "dos", "tres", "cuatro", "cinco"]);
        let limiter = ConcurrencyLimiter::new(2);
        limiter.close();

        let last = Mutex::new(None);
        let observer = |p: &BatchProgress| *last.lock().unwrap() = Some(p.clone());
        let outcome = processor
            .process_limited(request(&words), Some(&observer), &limiter)
            .await;

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.errors.len(), 3);
        assert!(outcome.errors.iter().all(|e| e.kind == ErrorKind::ApiUnavailable));
        assert_eq!(outcome.errors[2].words, strings(&["cinco"]));
        assert_eq!(provider.calls(), 0);

        let last = last.into_inner().unwrap().unwrap();
        assert_eq!(last.completed, 5);
        assert_eq!(last.errors.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_retry_is_the_only_retry_layer() {
        let provider = Scripted::new(usize::MAX, ErrorKind::Network);
        let processor = processor(provider.clone(), 2);
        let words = strings(&["uno", "dos"]);

        let outcome = processor.process(request(&words), None).await;
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::Network);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_retry_recovers_transient_failure() {
        let provider = Scripted::new(1, ErrorKind::RateLimit);
        let processor = processor(provider.clone(), 2);
        let words = strings(&["uno", "dos"]);

        let outcome = processor.process(request(&words), None).await;
        assert!(outcome.errors.is_empty());
        let found: Vec<_> = outcome.items.iter().map(|i| i.word.as_str()).collect();
        assert_eq!(found, ["uno", "dos"]);
        assert_eq!(provider.calls(), 2);
    }
}
