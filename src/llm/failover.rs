//! Provider fallback — local first, remote second.
//!
//! Each attempted provider runs under the retry executor. A non-retryable
//! failure (other than bad input, which says nothing about the provider)
//! marks that provider unavailable for the rest of the status window. When
//! every attempted provider fails, or none is available, the caller gets a
//! [`CompoundError`] carrying every recorded failure.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::provider::{AiProvider, execute_payload};
use super::status::{ProviderSlot, ProviderStatus, ProviderStatusCache};
use crate::config::ProviderConfig;
use crate::error::{AiError, CompoundError, ErrorKind, ProviderError, Retryable};
use crate::retry::{RetryPolicy, execute_with_retry};
use crate::task::{
    Difficulty, LanguageDetection, SummaryLength, TaskOutput, TaskPayload, VocabularyItem,
};

/// Runs tasks against the local provider with remote fallback.
pub struct FallbackCoordinator {
    local: Option<Arc<dyn AiProvider>>,
    remote: Option<Arc<dyn AiProvider>>,
    status: Arc<ProviderStatusCache>,
    retry: RetryPolicy,
}

impl FallbackCoordinator {
    pub fn new(
        local: Option<Arc<dyn AiProvider>>,
        remote: Option<Arc<dyn AiProvider>>,
        config: &ProviderConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            status: Arc::new(ProviderStatusCache::new(
                local.clone(),
                remote.clone(),
                config.status_ttl,
            )),
            local,
            remote,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Same providers and shared availability, different per-provider retry.
    /// Callers that retry whole operations themselves use this with
    /// [`RetryPolicy::none`] so attempts do not multiply.
    pub fn with_retry_policy(&self, retry: RetryPolicy) -> Self {
        Self {
            local: self.local.clone(),
            remote: self.remote.clone(),
            status: Arc::clone(&self.status),
            retry,
        }
    }

    /// Cached provider status, refreshed if stale.
    pub async fn status(&self) -> ProviderStatus {
        self.status.get().await
    }

    /// Re-probe providers, e.g. after credentials change.
    pub async fn refresh_status(&self, force: bool) -> ProviderStatus {
        self.status.refresh(force).await
    }

    /// Run any task payload through the fallback chain.
    pub async fn process_with_fallback(&self, payload: &TaskPayload) -> Result<TaskOutput, AiError> {
        if let TaskPayload::Translate { text, from, to } = payload
            && same_language(from, to)
        {
            return Ok(TaskOutput::Translate(text.clone()));
        }
        self.with_fallback(payload.kind().as_str(), |provider| async move {
            execute_payload(provider.as_ref(), payload).await
        })
        .await
    }

    pub async fn detect_language(&self, text: &str) -> Result<LanguageDetection, AiError> {
        self.with_fallback("detect_language", |provider| async move {
            provider.detect_language(text).await
        })
        .await
    }

    pub async fn summarize(&self, text: &str, length: SummaryLength) -> Result<String, AiError> {
        self.with_fallback("summarize", |provider| async move {
            provider.summarize(text, length).await
        })
        .await
    }

    pub async fn rewrite(&self, text: &str, difficulty: Difficulty) -> Result<String, AiError> {
        self.with_fallback("rewrite", |provider| async move {
            provider.rewrite(text, difficulty).await
        })
        .await
    }

    /// Translate `text`. Same source and target language returns the input
    /// without touching any provider.
    pub async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, AiError> {
        if same_language(from, to) {
            return Ok(text.to_string());
        }
        self.with_fallback("translate", |provider| async move {
            provider.translate(text, from, to).await
        })
        .await
    }

    pub async fn translate_batch(
        &self,
        items: &[String],
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, AiError> {
        if items.is_empty() || same_language(from, to) {
            return Ok(items.to_vec());
        }
        self.with_fallback("translate_batch", |provider| async move {
            provider.translate_batch(items, from, to).await
        })
        .await
    }

    pub async fn analyze_vocabulary(
        &self,
        words: &[String],
        language: &str,
    ) -> Result<Vec<VocabularyItem>, AiError> {
        if words.is_empty() {
            return Ok(Vec::new());
        }
        self.with_fallback("analyze_vocabulary", |provider| async move {
            provider.analyze_vocabulary(words, language).await
        })
        .await
    }

    async fn with_fallback<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, AiError>
    where
        F: Fn(Arc<dyn AiProvider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let status = self.status.get().await;
        let mut errors: Vec<ProviderError> = Vec::new();

        let chain = [
            (ProviderSlot::Local, self.local.as_ref()),
            (ProviderSlot::Remote, self.remote.as_ref()),
        ];

        for (slot, provider) in chain {
            let Some(provider) = provider else {
                continue;
            };
            if !status.is_available(slot) {
                debug!(operation, provider = slot.as_str(), "Skipping unavailable provider");
                continue;
            }

            let result = execute_with_retry(|| call(provider.clone()), &self.retry).await;
            let attempts = result.attempt_count();
            match result.into_result() {
                Ok(value) => {
                    if !errors.is_empty() {
                        info!(operation, provider = slot.as_str(), "Fallback provider succeeded");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        operation,
                        provider = slot.as_str(),
                        kind = %err.kind,
                        attempts,
                        error = %err.message,
                        "Provider failed"
                    );
                    if !err.is_retryable() && err.kind != ErrorKind::InvalidInput {
                        self.status.mark_unavailable(slot).await;
                    }
                    errors.push(err);
                }
            }
        }

        let compound = CompoundError::new(errors);
        if compound.errors.is_empty() {
            warn!(operation, "No AI provider available");
        }
        Err(AiError::Compound(compound))
    }
}

fn same_language(from: &str, to: &str) -> bool {
    from.trim().eq_ignore_ascii_case(to.trim())
}
