//! Configuration types.
//!
//! Every section has a `Default` carrying the documented defaults. `from_env`
//! overlays `AI_LEARN_*` environment variables; absent or unparsable values
//! fall back to the default.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::task::Difficulty;

/// Retry executor settings used by the fallback coordinator.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Symmetric jitter as a fraction of the computed delay (0.25 = ±25%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

/// Cache store settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time to live for every entry.
    pub ttl: Duration,
    /// Ceiling on the total estimated byte size.
    pub max_size_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_size_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Endpoint settings for one chat-completion provider.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub request_timeout: Duration,
}

/// Local and remote provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// On-device endpoint. `None` disables the local provider.
    pub local: Option<EndpointConfig>,
    /// Hosted API endpoint. `None` disables the remote provider.
    pub remote: Option<EndpointConfig>,
    /// How long a provider status probe stays valid.
    pub status_ttl: Duration,
    /// Largest input the constrained local provider accepts.
    pub local_max_input_chars: usize,
    /// Client-side sliding window budget for the remote provider.
    pub remote_requests_per_window: usize,
    pub remote_window: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            local: Some(EndpointConfig {
                base_url: "http://127.0.0.1:11434/v1".to_string(),
                model: "llama3.2".to_string(),
                api_key: None,
                request_timeout: Duration::from_secs(60),
            }),
            remote: None,
            status_ttl: Duration::from_secs(60),
            local_max_input_chars: 4_000,
            remote_requests_per_window: 60,
            remote_window: Duration::from_secs(60),
        }
    }
}

/// Batch and chunk processing settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    /// Batch-level retries around the whole fallback call.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_concurrency: 3,
            retry_attempts: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl BatchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: self.retry_delay,
            max_delay: self.retry_delay * 8,
            ..RetryPolicy::default()
        }
    }
}

/// Isolated worker context settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_pending_tasks: usize,
    pub task_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_pending_tasks: 5,
            task_timeout: Duration::from_secs(30),
        }
    }
}

/// Learning preferences applied by the binary.
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    pub target_language: Option<String>,
    pub difficulty: Difficulty,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            target_language: None,
            difficulty: Difficulty::Intermediate,
        }
    }
}

/// Complete orchestrator configuration.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub providers: ProviderConfig,
    pub batch: BatchConfig,
    pub worker: WorkerConfig,
    pub learner: LearnerConfig,
}

impl OrchestratorConfig {
    /// Build configuration from `AI_LEARN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("AI_LEARN_LOCAL_URL") {
            if url.is_empty() || url == "off" {
                config.providers.local = None;
            } else if let Some(local) = config.providers.local.as_mut() {
                local.base_url = url;
            }
        }
        if let Some(model) = lookup("AI_LEARN_LOCAL_MODEL")
            && let Some(local) = config.providers.local.as_mut()
        {
            local.model = model;
        }

        if let Some(url) = lookup("AI_LEARN_REMOTE_URL").filter(|u| !u.is_empty()) {
            let api_key = lookup("AI_LEARN_API_KEY").ok_or_else(|| ConfigError::MissingRequired {
                key: "AI_LEARN_API_KEY".to_string(),
                hint: "The remote provider needs an API key.".to_string(),
            })?;
            config.providers.remote = Some(EndpointConfig {
                base_url: url,
                model: lookup("AI_LEARN_REMOTE_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                api_key: Some(SecretString::from(api_key)),
                request_timeout: Duration::from_secs(60),
            });
        }

        config.providers.remote_requests_per_window = parse_or(
            &lookup,
            "AI_LEARN_RATE_LIMIT",
            config.providers.remote_requests_per_window,
        );
        config.cache.max_size_bytes =
            parse_or(&lookup, "AI_LEARN_CACHE_MAX_BYTES", config.cache.max_size_bytes);
        config.cache.ttl = Duration::from_secs(parse_or(
            &lookup,
            "AI_LEARN_CACHE_TTL_SECS",
            config.cache.ttl.as_secs(),
        ));
        config.batch.batch_size = parse_or(&lookup, "AI_LEARN_BATCH_SIZE", config.batch.batch_size);
        config.batch.max_concurrency = parse_or(
            &lookup,
            "AI_LEARN_MAX_CONCURRENCY",
            config.batch.max_concurrency,
        );
        config.worker.max_pending_tasks = parse_or(
            &lookup,
            "AI_LEARN_MAX_PENDING",
            config.worker.max_pending_tasks,
        );
        config.worker.task_timeout = Duration::from_secs(parse_or(
            &lookup,
            "AI_LEARN_TASK_TIMEOUT_SECS",
            config.worker.task_timeout.as_secs(),
        ));

        config.learner.target_language = lookup("AI_LEARN_TARGET_LANG").filter(|l| !l.is_empty());
        if let Some(raw) = lookup("AI_LEARN_DIFFICULTY") {
            config.learner.difficulty =
                raw.parse().map_err(|message| ConfigError::InvalidValue {
                    key: "AI_LEARN_DIFFICULTY".to_string(),
                    message,
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the orchestrator unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.batch_size == 0 {
            return Err(invalid("AI_LEARN_BATCH_SIZE", "must be at least 1"));
        }
        if self.batch.max_concurrency == 0 {
            return Err(invalid("AI_LEARN_MAX_CONCURRENCY", "must be at least 1"));
        }
        if self.worker.max_pending_tasks == 0 {
            return Err(invalid("AI_LEARN_MAX_PENDING", "must be at least 1"));
        }
        if self.cache.max_size_bytes == 0 {
            return Err(invalid("AI_LEARN_CACHE_MAX_BYTES", "must be positive"));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Unparsable configuration value, using default");
            default
        }),
        None => default,
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
