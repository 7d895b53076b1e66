//! `PromptProvider` — bridges an [`LlmProvider`] transport to [`AiProvider`].
//!
//! Each task kind becomes a system + user prompt pair; the model's reply is
//! parsed back into the typed artifact. Unparsable replies surface as
//! `processing_failed`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::prompts;
use super::provider::{AiProvider, ChatMessage, CompletionRequest, LlmProvider};
use super::rate_limit::RateLimiter;
use crate::error::ProviderError;
use crate::task::{Difficulty, LanguageDetection, SummaryLength, VocabularyItem};

/// Max tokens for short structured replies.
const STRUCTURED_MAX_TOKENS: u32 = 256;

/// Max tokens for free-text artifacts.
const TEXT_MAX_TOKENS: u32 = 2048;

/// Low temperature: these are extraction tasks, not creative writing.
const TASK_TEMPERATURE: f32 = 0.2;

/// Only this much of the text is needed to detect its language.
const DETECTION_SAMPLE_CHARS: usize = 1000;

/// [`AiProvider`] driven by prompts over a chat-completion transport.
pub struct PromptProvider {
    name: String,
    llm: Arc<dyn LlmProvider>,
    limiter: Option<Arc<RateLimiter>>,
    max_input_chars: Option<usize>,
}

impl PromptProvider {
    pub fn new(name: impl Into<String>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            name: name.into(),
            llm,
            limiter: None,
            max_input_chars: None,
        }
    }

    /// Acquire a slot from `limiter` before every call.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Reject inputs longer than `max_chars` as `invalid_input`.
    pub fn with_max_input_chars(mut self, max_chars: usize) -> Self {
        self.max_input_chars = Some(max_chars);
        self
    }

    fn check_input(&self, text: &str) -> Result<(), ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::invalid_input(self.name.clone(), "input is empty"));
        }
        if let Some(max) = self.max_input_chars {
            let len = text.chars().count();
            if len > max {
                return Err(ProviderError::invalid_input(
                    self.name.clone(),
                    format!("input is {len} characters, limit is {max}"),
                ));
            }
        }
        Ok(())
    }

    async fn ask(&self, system: String, user: String, max_tokens: u32) -> Result<String, ProviderError> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let request = CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .with_temperature(TASK_TEMPERATURE)
            .with_max_tokens(max_tokens);

        let response = self.llm.complete(request).await.map_err(|e| ProviderError {
            provider: self.name.clone(),
            ..e
        })?;
        debug!(
            provider = %self.name,
            model = self.llm.model_name(),
            output_tokens = response.output_tokens,
            "Provider replied"
        );
        Ok(response.content)
    }

    fn parse_failure(&self, raw: &str, reason: String) -> ProviderError {
        let preview: String = raw.chars().take(200).collect();
        warn!(provider = %self.name, raw_response = %preview, error = %reason, "Unparsable provider reply");
        ProviderError::processing(self.name.clone(), reason)
    }
}

#[async_trait]
impl AiProvider for PromptProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        match self.llm.health_check().await {
            Ok(()) => true,
            Err(e) => {
                debug!(provider = %self.name, error = %e, "Provider health check failed");
                false
            }
        }
    }

    async fn detect_language(&self, text: &str) -> Result<LanguageDetection, ProviderError> {
        let sample = prompts::truncate_chars(text, DETECTION_SAMPLE_CHARS);
        self.check_input(sample)?;
        let raw = self
            .ask(prompts::detect_language_system(), sample.to_string(), STRUCTURED_MAX_TOKENS)
            .await?;
        prompts::parse_detection(&raw).map_err(|e| self.parse_failure(&raw, e))
    }

    async fn summarize(&self, text: &str, length: SummaryLength) -> Result<String, ProviderError> {
        self.check_input(text)?;
        let raw = self
            .ask(prompts::summarize_system(length), text.to_string(), TEXT_MAX_TOKENS)
            .await?;
        prompts::parse_text(&raw).map_err(|e| self.parse_failure(&raw, e))
    }

    async fn rewrite(&self, text: &str, difficulty: Difficulty) -> Result<String, ProviderError> {
        self.check_input(text)?;
        let raw = self
            .ask(prompts::rewrite_system(difficulty), text.to_string(), TEXT_MAX_TOKENS)
            .await?;
        prompts::parse_text(&raw).map_err(|e| self.parse_failure(&raw, e))
    }

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, ProviderError> {
        self.check_input(text)?;
        let raw = self
            .ask(prompts::translate_system(from, to), text.to_string(), TEXT_MAX_TOKENS)
            .await?;
        prompts::parse_text(&raw).map_err(|e| self.parse_failure(&raw, e))
    }

    async fn analyze_vocabulary(
        &self,
        words: &[String],
        language: &str,
    ) -> Result<Vec<VocabularyItem>, ProviderError> {
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let user = prompts::vocabulary_user(words);
        self.check_input(&user)?;
        let raw = self
            .ask(prompts::vocabulary_system(language), user, TEXT_MAX_TOKENS)
            .await?;
        prompts::parse_vocabulary(&raw).map_err(|e| self.parse_failure(&raw, e))
    }

    async fn translate_batch(
        &self,
        items: &[String],
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, ProviderError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let user = prompts::translate_batch_user(items);
        self.check_input(&user)?;
        let raw = self
            .ask(prompts::translate_batch_system(from, to), user, TEXT_MAX_TOKENS)
            .await?;
        Ok(prompts::parse_indexed(&raw, items))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::llm::provider::{CompletionResponse, FinishReason};

    /// Replays canned replies and records the prompts it saw.
    struct ScriptedLlm {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            self.seen.lock().unwrap().push(request);
            let reply = self.replies.lock().unwrap().remove(0)?;
            Ok(CompletionResponse {
                content: reply,
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[tokio::test]
    async fn detection_parses_json_reply() {
        let llm = ScriptedLlm::new(vec![Ok(r#"{"language": "fr", "confidence": 0.93}"#.into())]);
        let provider = PromptProvider::new("local", llm);
        let detection = provider.detect_language("Bonjour tout le monde").await.unwrap();
        assert_eq!(detection.language, "fr");
    }

    #[tokio::test]
    async fn over_budget_input_is_invalid_without_calling_model() {
        let llm = ScriptedLlm::new(vec![]);
        let provider = PromptProvider::new("local", llm.clone()).with_max_input_chars(10);
        let err = provider
            .summarize("This text is far longer than ten characters.", SummaryLength::Short)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn transport_errors_are_relabelled() {
        let llm = ScriptedLlm::new(vec![Err(ProviderError::rate_limited("http", "429"))]);
        let provider = PromptProvider::new("remote", llm);
        let err = provider.translate("hello", "en", "es").await.unwrap_err();
        assert_eq!(err.provider, "remote");
        assert_eq!(err.kind, ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn garbage_reply_is_processing_failure() {
        let llm = ScriptedLlm::new(vec![Ok("no idea, sorry".into())]);
        let provider = PromptProvider::new("local", llm);
        let err = provider.detect_language("hola").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProcessingFailed);
    }

    #[tokio::test]
    async fn batch_translation_uses_single_call() {
        let llm = ScriptedLlm::new(vec![Ok("[1] gato\n[2] perro".into())]);
        let provider = PromptProvider::new("remote", llm.clone());
        let items = vec!["cat".to_string(), "dog".to_string()];
        let out = provider.translate_batch(&items, "en", "es").await.unwrap();
        assert_eq!(out, vec!["gato", "perro"]);
        assert_eq!(llm.calls(), 1);
        let user = &llm.seen.lock().unwrap()[0].messages[1].content;
        assert!(user.starts_with("[1] cat"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_gates_calls() {
        let llm = ScriptedLlm::new(vec![Ok("uno".into()), Ok("dos".into())]);
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let provider = PromptProvider::new("remote", llm).with_rate_limiter(limiter);

        let started = tokio::time::Instant::now();
        provider.translate("one", "en", "es").await.unwrap();
        provider.translate("two", "en", "es").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn empty_vocabulary_skips_model() {
        let llm = ScriptedLlm::new(vec![]);
        let provider = PromptProvider::new("local", llm.clone());
        assert!(provider.analyze_vocabulary(&[], "en").await.unwrap().is_empty());
        assert_eq!(llm.calls(), 0);
    }
}
