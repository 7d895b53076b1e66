//! OpenAI-compatible `/chat/completions` client.
//!
//! Works against hosted APIs and local runtimes that expose the same surface
//! (llama.cpp server, Ollama's `/v1`, vLLM).

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::provider::{ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use crate::config::EndpointConfig;
use crate::error::{ErrorKind, ProviderError};

/// Chat-completion client for one endpoint.
pub struct OpenAiCompatClient {
    label: String,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(label: impl Into<String>, endpoint: &EndpointConfig) -> Result<Self, ProviderError> {
        let label = label.into();
        let client = reqwest::Client::builder()
            .timeout(endpoint.request_timeout)
            .build()
            .map_err(|e| {
                ProviderError::unavailable(label.clone(), format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            label,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.model.clone(),
            api_key: endpoint.api_key.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        let kind = if err.is_decode() {
            ErrorKind::ProcessingFailed
        } else {
            ErrorKind::Network
        };
        ProviderError::new(self.label.clone(), kind, err.to_string())
    }

    fn status_error(&self, status: StatusCode, body: &str) -> ProviderError {
        let detail: String = body.chars().take(300).collect();
        ProviderError::new(
            self.label.clone(),
            classify_status(status),
            format!("HTTP {status}: {detail}"),
        )
    }
}

/// Map an HTTP failure status onto the error taxonomy.
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        429 => ErrorKind::RateLimit,
        401 | 403 | 404 | 503 => ErrorKind::ApiUnavailable,
        408 | 504 => ErrorKind::Network,
        400 | 413 | 422 => ErrorKind::InvalidInput,
        _ => ErrorKind::ProcessingFailed,
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiCompatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let body = ChatRequestBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let resp = self
            .authorized(self.client.post(self.url("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(self.status_error(status, &text));
        }

        let parsed: ChatResponseBody = resp.json().await.map_err(|e| self.transport_error(e))?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(ProviderError::processing(self.label.clone(), "response had no choices"));
        };
        let usage = parsed.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        debug!(
            provider = %self.label,
            model = %self.model,
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "Completion received"
        );

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let resp = self
            .authorized(self.client.get(self.url("models")))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(self.status_error(status, &text))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), ErrorKind::RateLimit);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ErrorKind::ApiUnavailable);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE), ErrorKind::ApiUnavailable);
        assert_eq!(classify_status(StatusCode::PAYLOAD_TOO_LARGE), ErrorKind::InvalidInput);
        assert_eq!(classify_status(StatusCode::GATEWAY_TIMEOUT), ErrorKind::Network);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), ErrorKind::ProcessingFailed);
    }

    #[test]
    fn client_normalizes_base_url() {
        let client = OpenAiCompatClient::new(
            "local",
            &EndpointConfig {
                base_url: "http://127.0.0.1:11434/v1/".into(),
                model: "llama3.2".into(),
                api_key: None,
                request_timeout: Duration::from_secs(5),
            },
        )
        .unwrap();
        assert_eq!(client.url("models"), "http://127.0.0.1:11434/v1/models");
        assert_eq!(client.model_name(), "llama3.2");
    }

    #[test]
    fn request_body_omits_unset_options() {
        let messages = vec![ChatMessage::user("hi")];
        let body = ChatRequestBody {
            model: "m",
            messages: &messages,
            temperature: None,
            max_tokens: Some(10),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["max_tokens"], 10);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn response_body_tolerates_missing_usage() {
        let parsed: ChatResponseBody = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "hola"}, "finish_reason": "stop"}]}"#,
        )
        .unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hola"));
    }
}
