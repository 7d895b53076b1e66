//! Cache-first artifact generation.
//!
//! Every lookup is keyed by the content hash plus the operation and its
//! parameter, so one text is cached independently per summary length or
//! rewrite difficulty. Results are stored only on success.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cache::{CacheStore, content_hash};
use crate::error::AiError;
use crate::llm::FallbackCoordinator;
use crate::task::{Difficulty, LanguageDetection, SummaryLength, VocabularyItem};

/// A value and whether it came from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub hit: bool,
}

/// Generates learning artifacts through the coordinator, memoized in the cache.
pub struct ArtifactService {
    coordinator: Arc<FallbackCoordinator>,
    cache: Arc<CacheStore>,
}

impl ArtifactService {
    pub fn new(coordinator: Arc<FallbackCoordinator>, cache: Arc<CacheStore>) -> Self {
        Self { coordinator, cache }
    }

    pub fn coordinator(&self) -> &Arc<FallbackCoordinator> {
        &self.coordinator
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    async fn cached<T, F, Fut>(
        &self,
        hash: &str,
        op_type: &str,
        parameter: &str,
        produce: F,
    ) -> Result<Cached<T>, AiError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AiError>>,
    {
        if let Some(value) = self
            .cache
            .get_cached_processed_content::<T>(hash, op_type, parameter)
            .await
        {
            debug!(op_type, parameter, "Artifact served from cache");
            return Ok(Cached { value, hit: true });
        }

        let value = produce().await?;
        self.cache
            .set_cached_processed_content(hash, op_type, parameter, &value)
            .await;
        Ok(Cached { value, hit: false })
    }

    pub async fn detect_language(&self, text: &str) -> Result<Cached<LanguageDetection>, AiError> {
        let hash = content_hash(text);
        self.cached(&hash, "language", "detect", || {
            self.coordinator.detect_language(text)
        })
        .await
    }

    pub async fn summarize(
        &self,
        text: &str,
        length: SummaryLength,
    ) -> Result<Cached<String>, AiError> {
        let hash = content_hash(text);
        self.cached(&hash, "summary", length.as_str(), || {
            self.coordinator.summarize(text, length)
        })
        .await
    }

    pub async fn rewrite(
        &self,
        text: &str,
        difficulty: Difficulty,
    ) -> Result<Cached<String>, AiError> {
        let hash = content_hash(text);
        self.cached(&hash, "rewrite", difficulty.as_str(), || {
            self.coordinator.rewrite(text, difficulty)
        })
        .await
    }

    /// Vocabulary for `words`, keyed by the text they were drawn from and
    /// by the word list itself.
    pub async fn vocabulary(
        &self,
        source_text: &str,
        words: &[String],
        language: &str,
    ) -> Result<Cached<Vec<VocabularyItem>>, AiError> {
        let hash = content_hash(source_text);
        let parameter = format!("{language}:{}", content_hash(&words.join("\n")));
        self.cached(&hash, "vocabulary", &parameter, || {
            self.coordinator.analyze_vocabulary(words, language)
        })
        .await
    }

    /// Translate `text`, using the dedicated translation key.
    pub async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<Cached<String>, AiError> {
        let hash = content_hash(text);
        if let Some(value) = self.cache.get_cached_translation(&hash, from, to).await {
            return Ok(Cached { value, hit: true });
        }
        let value = self.coordinator.translate(text, from, to).await?;
        if value != text {
            self.cache.set_cached_translation(&hash, from, to, &value).await;
        }
        Ok(Cached { value, hit: false })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::{CacheConfig, ProviderConfig};
    use crate::error::ProviderError;
    use crate::llm::AiProvider;
    use crate::retry::RetryPolicy;

    /// Echoes its inputs back so each result shows what was asked for.
    #[derive(Default)]
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AiProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn detect_language(&self, _text: &str) -> Result<LanguageDetection, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LanguageDetection {
                language: "en".into(),
                confidence: 0.9,
            })
        }
        async fn summarize(&self, text: &str, length: SummaryLength) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}: {text}", length.as_str()))
        }
        async fn rewrite(&self, text: &str, difficulty: Difficulty) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}: {text}", difficulty.as_str()))
        }
        async fn translate(&self, text: &str, _: &str, to: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("[{to}] {text}"))
        }
        async fn analyze_vocabulary(
            &self,
            words: &[String],
            _language: &str,
        ) -> Result<Vec<VocabularyItem>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(words
                .iter()
                .map(|word| VocabularyItem {
                    word: word.clone(),
                    definition: format!("meaning of {word}"),
                    difficulty: Difficulty::default(),
                    part_of_speech: None,
                    example: None,
                    translation: None,
                })
                .collect())
        }
    }

    fn service() -> (ArtifactService, Arc<Echo>) {
        let provider = Arc::new(Echo::default());
        let coordinator = FallbackCoordinator::new(
            Some(provider.clone() as Arc<dyn AiProvider>),
            None,
            &ProviderConfig::default(),
            RetryPolicy::none(),
        );
        let cache = Arc::new(CacheStore::in_memory(&CacheConfig::default()));
        (ArtifactService::new(Arc::new(coordinator), cache), provider)
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[tokio::test]
    async fn repeated_request_is_served_from_cache() {
        let (service, provider) = service();
        let first = service.summarize("text", SummaryLength::Short).await.unwrap();
        let second = service.summarize("text", SummaryLength::Short).await.unwrap();
        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(second.value, first.value);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn summary_lengths_are_cached_separately() {
        let (service, provider) = service();
        let short = service.summarize("text", SummaryLength::Short).await.unwrap();
        let long = service.summarize("text", SummaryLength::Long).await.unwrap();
        assert!(!long.hit);
        assert_eq!(short.value, "short: text");
        assert_eq!(long.value, "long: text");

        let short_again = service.summarize("text", SummaryLength::Short).await.unwrap();
        assert!(short_again.hit);
        assert_eq!(short_again.value, "short: text");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn vocabulary_is_keyed_by_word_list() {
        let (service, provider) = service();
        let text = "The quick brown fox jumps over the lazy dog";

        let first = service
            .vocabulary(text, &words(&["quick", "brown"]), "en")
            .await
            .unwrap();
        let second = service
            .vocabulary(text, &words(&["lazy", "jumps"]), "en")
            .await
            .unwrap();
        assert!(!second.hit);
        let found: Vec<_> = second.value.iter().map(|i| i.word.as_str()).collect();
        assert_eq!(found, ["lazy", "jumps"]);

        let first_again = service
            .vocabulary(text, &words(&["quick", "brown"]), "en")
            .await
            .unwrap();
        assert!(first_again.hit);
        assert_eq!(first_again.value, first.value);

        let other_language = service
            .vocabulary(text, &words(&["quick", "brown"]), "fr")
            .await
            .unwrap();
        assert!(!other_language.hit);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn translation_is_cached_by_language_pair() {
        let (service, _provider) = service();
        let translated = service.translate("hello", "en", "es").await.unwrap();
        assert_eq!(translated.value, "[es] hello");
        assert!(service.translate("hello", "en", "es").await.unwrap().hit);
    }
}
