//! AI provider integration.
//!
//! - `provider` — the [`LlmProvider`] transport and [`AiProvider`] task traits
//! - `http` — OpenAI-compatible chat-completion client (local runtimes and hosted APIs)
//! - `adapter` — [`PromptProvider`], prompt-driven [`AiProvider`] over any transport
//! - `failover` — [`FallbackCoordinator`], local-first with remote fallback
//! - `status` — cached provider availability
//! - `rate_limit` — client-side sliding window for the remote API

pub mod adapter;
pub mod failover;
pub mod http;
pub mod prompts;
pub mod provider;
pub mod rate_limit;
pub mod status;

pub use adapter::PromptProvider;
pub use failover::FallbackCoordinator;
pub use http::OpenAiCompatClient;
pub use provider::*;
pub use rate_limit::RateLimiter;
pub use status::{ProviderSlot, ProviderStatus, ProviderStatusCache};

use std::sync::Arc;

use crate::config::{EndpointConfig, OrchestratorConfig, ProviderConfig};
use crate::error::ProviderError;

/// Local and remote providers built from configuration. Either may be absent.
#[derive(Clone, Default)]
pub struct ProviderPair {
    pub local: Option<Arc<dyn AiProvider>>,
    pub remote: Option<Arc<dyn AiProvider>>,
}

/// Build the local provider: input-size constrained, no rate limit.
pub fn create_local_provider(
    endpoint: &EndpointConfig,
    config: &ProviderConfig,
) -> Result<Arc<dyn AiProvider>, ProviderError> {
    let client = OpenAiCompatClient::new("local", endpoint)?;
    tracing::info!(url = %endpoint.base_url, model = %endpoint.model, "Using local provider");
    Ok(Arc::new(
        PromptProvider::new("local", Arc::new(client))
            .with_max_input_chars(config.local_max_input_chars),
    ))
}

/// Build the remote provider behind the sliding-window rate limiter.
pub fn create_remote_provider(
    endpoint: &EndpointConfig,
    config: &ProviderConfig,
) -> Result<Arc<dyn AiProvider>, ProviderError> {
    let client = OpenAiCompatClient::new("remote", endpoint)?;
    let limiter = RateLimiter::new(config.remote_requests_per_window, config.remote_window);
    tracing::info!(
        url = %endpoint.base_url,
        model = %endpoint.model,
        rate_limit = config.remote_requests_per_window,
        "Using remote provider"
    );
    Ok(Arc::new(
        PromptProvider::new("remote", Arc::new(client)).with_rate_limiter(Arc::new(limiter)),
    ))
}

pub fn create_providers(config: &ProviderConfig) -> Result<ProviderPair, ProviderError> {
    let local = config
        .local
        .as_ref()
        .map(|endpoint| create_local_provider(endpoint, config))
        .transpose()?;
    let remote = config
        .remote
        .as_ref()
        .map(|endpoint| create_remote_provider(endpoint, config))
        .transpose()?;
    if local.is_none() && remote.is_none() {
        tracing::warn!("No AI provider configured; every task will fail as api_unavailable");
    }
    Ok(ProviderPair { local, remote })
}

/// Fallback coordinator over an explicit provider pair.
pub fn create_coordinator(providers: ProviderPair, config: &OrchestratorConfig) -> FallbackCoordinator {
    FallbackCoordinator::new(
        providers.local,
        providers.remote,
        &config.providers,
        config.retry.policy(),
    )
}
