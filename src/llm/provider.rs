//! Provider traits.
//!
//! Two layers:
//! - [`LlmProvider`] is the chat-completion transport (one HTTP endpoint).
//! - [`AiProvider`] is the task-level surface the fallback coordinator drives:
//!   one method per task kind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::task::{Difficulty, LanguageDetection, SummaryLength, TaskOutput, TaskPayload, VocabularyItem};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Other,
}

impl FinishReason {
    pub fn from_api(raw: Option<&str>) -> Self {
        match raw {
            Some("stop") | None => Self::Stop,
            Some("length") => Self::Length,
            Some(_) => Self::Other,
        }
    }
}

/// A chat completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// Chat-completion transport.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Cheap reachability probe. Defaults to "reachable".
    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Task-level provider: a local on-device capability or a remote API.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Stable label used in errors and logs (`"local"`, `"remote"`).
    fn name(&self) -> &str;

    /// Probe availability. Called at most once per status window.
    async fn is_available(&self) -> bool;

    async fn detect_language(&self, text: &str) -> Result<LanguageDetection, ProviderError>;

    async fn summarize(&self, text: &str, length: SummaryLength) -> Result<String, ProviderError>;

    async fn rewrite(&self, text: &str, difficulty: Difficulty) -> Result<String, ProviderError>;

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, ProviderError>;

    async fn analyze_vocabulary(
        &self,
        words: &[String],
        language: &str,
    ) -> Result<Vec<VocabularyItem>, ProviderError>;

    /// Translate several items. The default translates them one by one.
    async fn translate_batch(
        &self,
        items: &[String],
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let mut translated = Vec::with_capacity(items.len());
        for item in items {
            translated.push(self.translate(item, from, to).await?);
        }
        Ok(translated)
    }
}

/// Dispatch a [`TaskPayload`] to the matching [`AiProvider`] method.
pub async fn execute_payload(
    provider: &dyn AiProvider,
    payload: &TaskPayload,
) -> Result<TaskOutput, ProviderError> {
    match payload {
        TaskPayload::DetectLanguage { text } => provider
            .detect_language(text)
            .await
            .map(TaskOutput::DetectLanguage),
        TaskPayload::Summarize { text, length } => provider
            .summarize(text, *length)
            .await
            .map(TaskOutput::Summarize),
        TaskPayload::Rewrite { text, difficulty } => provider
            .rewrite(text, *difficulty)
            .await
            .map(TaskOutput::Rewrite),
        TaskPayload::Translate { text, from, to } => provider
            .translate(text, from, to)
            .await
            .map(TaskOutput::Translate),
        TaskPayload::AnalyzeVocabulary { words, language } => provider
            .analyze_vocabulary(words, language)
            .await
            .map(TaskOutput::AnalyzeVocabulary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl AiProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn detect_language(&self, _text: &str) -> Result<LanguageDetection, ProviderError> {
            Ok(LanguageDetection {
                language: "en".into(),
                confidence: 1.0,
            })
        }

        async fn summarize(&self, text: &str, _length: SummaryLength) -> Result<String, ProviderError> {
            Ok(format!("summary of {text}"))
        }

        async fn rewrite(&self, text: &str, difficulty: Difficulty) -> Result<String, ProviderError> {
            Ok(format!("{difficulty}: {text}"))
        }

        async fn translate(&self, text: &str, _from: &str, to: &str) -> Result<String, ProviderError> {
            Ok(format!("{to}:{text}"))
        }

        async fn analyze_vocabulary(
            &self,
            _words: &[String],
            _language: &str,
        ) -> Result<Vec<VocabularyItem>, ProviderError> {
            Err(ProviderError::processing("echo", "not supported"))
        }
    }

    #[tokio::test]
    async fn payload_dispatch_matches_kind() {
        let output = execute_payload(
            &Echo,
            &TaskPayload::Rewrite {
                text: "hard words".into(),
                difficulty: Difficulty::Beginner,
            },
        )
        .await
        .unwrap();
        assert_eq!(output, TaskOutput::Rewrite("beginner: hard words".into()));
    }

    #[tokio::test]
    async fn default_translate_batch_preserves_order() {
        let items = vec!["one".to_string(), "two".to_string()];
        let out = Echo.translate_batch(&items, "en", "fr").await.unwrap();
        assert_eq!(out, vec!["fr:one", "fr:two"]);
    }

    #[tokio::test]
    async fn dispatch_propagates_provider_error() {
        let err = execute_payload(
            &Echo,
            &TaskPayload::AnalyzeVocabulary {
                words: vec!["word".into()],
                language: "en".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.provider, "echo");
    }

    #[test]
    fn finish_reason_parsing() {
        assert_eq!(FinishReason::from_api(Some("length")), FinishReason::Length);
        assert_eq!(FinishReason::from_api(None), FinishReason::Stop);
        assert_eq!(FinishReason::from_api(Some("content_filter")), FinishReason::Other);
    }
}
