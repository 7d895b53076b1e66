//! Error types for AI Learn.
//!
//! Every failure the orchestration core produces maps onto one of the five
//! [`ErrorKind`] entries, so the application layer can turn it into user
//! guidance without probing error shapes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification shared by every provider-facing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure (connection refused, reset, request timeout).
    Network,
    /// Provider is missing, unconfigured or refusing service.
    ApiUnavailable,
    /// Provider asked us to slow down.
    RateLimit,
    /// Caller supplied something the provider cannot handle.
    InvalidInput,
    /// Generic provider failure, including unparsable responses.
    ProcessingFailed,
}

impl ErrorKind {
    /// `network` and `rate_limit` are retryable by convention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::ApiUnavailable => "api_unavailable",
            Self::RateLimit => "rate_limit",
            Self::InvalidInput => "invalid_input",
            Self::ProcessingFailed => "processing_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything the retry executor can classify.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// A single classified failure reported by one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{provider} provider failed ({kind}): {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::Network, message)
    }

    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::ApiUnavailable, message)
    }

    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::RateLimit, message)
    }

    pub fn invalid_input(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::InvalidInput, message)
    }

    pub fn processing(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::ProcessingFailed, message)
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Aggregate of every per-provider failure from one fallback attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{}", describe_failures(.errors))]
pub struct CompoundError {
    pub errors: Vec<ProviderError>,
}

impl CompoundError {
    pub fn new(errors: Vec<ProviderError>) -> Self {
        Self { errors }
    }

    /// AND of the constituent flags. An empty compound (no provider was
    /// attempted at all) is not retryable.
    pub fn retryable(&self) -> bool {
        !self.errors.is_empty() && self.errors.iter().all(|e| e.is_retryable())
    }

    /// The kind reported to callers: the first attempted provider's kind, or
    /// `api_unavailable` when nothing could be attempted.
    pub fn kind(&self) -> ErrorKind {
        self.errors
            .first()
            .map(|e| e.kind)
            .unwrap_or(ErrorKind::ApiUnavailable)
    }
}

fn describe_failures(errors: &[ProviderError]) -> String {
    if errors.is_empty() {
        return "No AI provider available".to_string();
    }
    let joined = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!("All AI providers failed: {joined}")
}

/// Result of an AI task: one provider failure or a compound of all of them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Compound(#[from] CompoundError),
}

impl AiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(e) => e.kind,
            Self::Compound(e) => e.kind(),
        }
    }
}

impl Retryable for AiError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Compound(e) => e.retryable(),
        }
    }
}

/// Failure reported from inside the isolated worker context.
///
/// This is the wire shape of an error crossing the context boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct WorkerFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&AiError> for WorkerFailure {
    fn from(err: &AiError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Errors reported by the sandbox host platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Worker context already exists")]
    AlreadyExists,

    #[error("Worker context {0} not found")]
    NotFound(String),

    #[error("Host unavailable: {0}")]
    Unavailable(String),

    #[error("Message channel error: {0}")]
    Channel(String),
}

/// Worker lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("Too many pending worker tasks (max {max})")]
    QueueFull { max: usize },

    #[error("Worker task {task_id} timed out after {timeout:?}")]
    Timeout { task_id: Uuid, timeout: Duration },

    #[error("Worker task {task_id} was cancelled")]
    Cancelled { task_id: Uuid },

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Worker context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("Worker task failed: {0}")]
    Task(WorkerFailure),
}

impl WorkerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QueueFull { .. } => ErrorKind::RateLimit,
            Self::Timeout { .. } | Self::Cancelled { .. } => ErrorKind::ProcessingFailed,
            Self::Host(_) | Self::ContextUnavailable(_) => ErrorKind::ApiUnavailable,
            Self::Task(failure) => failure.kind,
        }
    }
}

impl Retryable for WorkerError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Task(failure) => failure.retryable,
            _ => false,
        }
    }
}

/// One failed vocabulary batch. Recorded in the run outcome; the run goes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// 0-based batch index.
    pub batch_index: usize,
    pub words: Vec<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl BatchError {
    pub fn from_ai(batch_index: usize, words: &[String], err: &AiError) -> Self {
        Self {
            batch_index,
            words: words.to_vec(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Cache backing-store errors. These never escape the cache store's
/// get/set surface; they degrade to misses.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for AI Learn.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(!ErrorKind::ApiUnavailable.is_retryable());
        assert!(!ErrorKind::InvalidInput.is_retryable());
        assert!(!ErrorKind::ProcessingFailed.is_retryable());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ApiUnavailable).unwrap();
        assert_eq!(json, "\"api_unavailable\"");
        assert_eq!(ErrorKind::RateLimit.to_string(), "rate_limit");
    }

    #[test]
    fn compound_message_contains_all_providers() {
        let err = CompoundError::new(vec![
            ProviderError::network("local", "connection refused"),
            ProviderError::processing("remote", "bad gateway"),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("All AI providers failed: "));
        assert!(msg.contains("local provider failed (network): connection refused; "));
        assert!(msg.contains("bad gateway"));
        assert!(!err.retryable());
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn compound_retryable_only_when_all_are() {
        let err = CompoundError::new(vec![
            ProviderError::network("local", "reset"),
            ProviderError::rate_limited("remote", "slow down"),
        ]);
        assert!(err.retryable());
    }

    #[test]
    fn empty_compound_is_unavailable() {
        let err = CompoundError::new(vec![]);
        assert!(!err.retryable());
        assert_eq!(err.kind(), ErrorKind::ApiUnavailable);
        assert_eq!(err.to_string(), "No AI provider available");
        let wrapped: Box<dyn std::error::Error> = Box::new(AiError::from(err));
        assert_eq!(wrapped.to_string(), "No AI provider available");
    }

    #[test]
    fn worker_timeout_is_never_retryable() {
        let err = WorkerError::Timeout {
            task_id: Uuid::new_v4(),
            timeout: Duration::from_secs(30),
        };
        assert!(err.is_timeout());
        assert!(!err.is_retryable());
    }

    #[test]
    fn worker_failure_from_ai_error() {
        let err = AiError::Provider(ProviderError::rate_limited("remote", "429"));
        let failure = WorkerFailure::from(&err);
        assert_eq!(failure.kind, ErrorKind::RateLimit);
        assert!(failure.retryable);
        assert!(failure.message.contains("429"));
    }
}
