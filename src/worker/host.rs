//! Sandbox host abstraction.
//!
//! The host owns the platform side of the isolated context: it lists, creates
//! and closes contexts and carries messages into them. Results come back on
//! the response channel handed out when the host is built.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ErrorKind, HostError, WorkerFailure};
use crate::llm::FallbackCoordinator;

use super::protocol::{ContextInfo, WorkerRequest, WorkerResponse};

pub type ResponseSender = mpsc::UnboundedSender<WorkerResponse>;
pub type ResponseReceiver = mpsc::UnboundedReceiver<WorkerResponse>;

/// Platform that can host at most one isolated worker context.
#[async_trait]
pub trait SandboxHost: Send + Sync {
    /// Contexts that currently exist, including ones created elsewhere.
    async fn list_contexts(&self) -> Result<Vec<ContextInfo>, HostError>;

    /// Create the context. Fails with `AlreadyExists` if one is live.
    async fn create_context(&self) -> Result<ContextInfo, HostError>;

    async fn close_context(&self, id: &str) -> Result<(), HostError>;

    /// Post a request into the live context. The result arrives later on the
    /// response channel.
    async fn send(&self, request: WorkerRequest) -> Result<(), HostError>;
}

/// Runs tasks on spawned tokio tasks against a fallback coordinator.
pub struct InProcessHost {
    coordinator: Arc<FallbackCoordinator>,
    context: Mutex<Option<ContextInfo>>,
    running: Mutex<JoinSet<()>>,
    responses: ResponseSender,
    creations: AtomicUsize,
}

impl InProcessHost {
    pub fn new(coordinator: Arc<FallbackCoordinator>) -> (Arc<Self>, ResponseReceiver) {
        let (responses, receiver) = mpsc::unbounded_channel();
        let host = Arc::new(Self {
            coordinator,
            context: Mutex::new(None),
            running: Mutex::new(JoinSet::new()),
            responses,
            creations: AtomicUsize::new(0),
        });
        (host, receiver)
    }

    /// Number of contexts this host has created.
    pub fn creation_count(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    fn current(&self) -> Option<ContextInfo> {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SandboxHost for InProcessHost {
    async fn list_contexts(&self) -> Result<Vec<ContextInfo>, HostError> {
        Ok(self.current().into_iter().collect())
    }

    async fn create_context(&self) -> Result<ContextInfo, HostError> {
        let mut context = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        if context.is_some() {
            return Err(HostError::AlreadyExists);
        }
        let info = ContextInfo {
            id: format!("ctx-{}", Uuid::new_v4()),
            created_at: Utc::now(),
        };
        self.creations.fetch_add(1, Ordering::SeqCst);
        info!(context_id = %info.id, "Created in-process worker context");
        *context = Some(info.clone());
        Ok(info)
    }

    async fn close_context(&self, id: &str) -> Result<(), HostError> {
        let mut context = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        match context.as_ref() {
            Some(current) if current.id == id => {
                *context = None;
                self.running
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .abort_all();
                info!(context_id = id, "Closed in-process worker context");
                Ok(())
            }
            _ => Err(HostError::NotFound(id.to_string())),
        }
    }

    async fn send(&self, request: WorkerRequest) -> Result<(), HostError> {
        if self.current().is_none() {
            return Err(HostError::Unavailable("no live worker context".into()));
        }

        let coordinator = Arc::clone(&self.coordinator);
        let responses = self.responses.clone();
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        while running.try_join_next().is_some() {}
        running.spawn(async move {
            let task_id = request.task_id;
            let response = match request.payload() {
                Ok(payload) => match coordinator.process_with_fallback(&payload).await {
                    Ok(output) => match serde_json::to_value(&output) {
                        Ok(value) => WorkerResponse::success(task_id, value),
                        Err(e) => WorkerResponse::failure(
                            task_id,
                            WorkerFailure {
                                kind: ErrorKind::ProcessingFailed,
                                message: format!("failed to encode result: {e}"),
                                retryable: false,
                            },
                        ),
                    },
                    Err(err) => WorkerResponse::failure(task_id, WorkerFailure::from(&err)),
                },
                Err(failure) => WorkerResponse::failure(task_id, failure),
            };
            if responses.send(response).is_err() {
                debug!(%task_id, "Response channel closed, dropping result");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::error::ProviderError;
    use crate::llm::AiProvider;
    use crate::retry::RetryPolicy;
    use crate::task::{
        Difficulty, LanguageDetection, SummaryLength, TaskKind, TaskOutput, TaskPayload,
        VocabularyItem,
    };
    use crate::worker::protocol::{WorkerOutcome, decode_output};

    struct Upper;

    #[async_trait]
    impl AiProvider for Upper {
        fn name(&self) -> &str {
            "upper"
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
        async fn summarize(&self, text: &str, _: SummaryLength) -> Result<String, ProviderError> {
            Ok(text.to_uppercase())
        }
        async fn rewrite(&self, text: &str, _: Difficulty) -> Result<String, ProviderError> {
            Ok(text.to_uppercase())
        }
        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, ProviderError> {
            Ok(text.to_uppercase())
        }
        async fn analyze_vocabulary(
            &self,
            _words: &[String],
            _language: &str,
        ) -> Result<Vec<VocabularyItem>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn host() -> (Arc<InProcessHost>, ResponseReceiver) {
        let coordinator = FallbackCoordinator::new(
            Some(Arc::new(Upper) as Arc<dyn AiProvider>),
            None,
            &ProviderConfig::default(),
            RetryPolicy::none(),
        );
        InProcessHost::new(Arc::new(coordinator))
    }

    #[tokio::test]
    async fn second_create_reports_existing() {
        let (host, _rx) = host();
        let first = host.create_context().await.unwrap();
        assert_eq!(host.create_context().await, Err(HostError::AlreadyExists));
        assert_eq!(host.list_contexts().await.unwrap(), vec![first]);
        assert_eq!(host.creation_count(), 1);
    }

    #[tokio::test]
    async fn send_requires_live_context() {
        let (host, _rx) = host();
        let payload = TaskPayload::Summarize {
            text: "x".into(),
            length: SummaryLength::Short,
        };
        let request = WorkerRequest::from_payload(Uuid::new_v4(), &payload).unwrap();
        assert!(matches!(
            host.send(request).await,
            Err(HostError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn executes_and_reports_on_channel() {
        let (host, mut rx) = host();
        host.create_context().await.unwrap();

        let task_id = Uuid::new_v4();
        let payload = TaskPayload::Summarize {
            text: "hello".into(),
            length: SummaryLength::Short,
        };
        host.send(WorkerRequest::from_payload(task_id, &payload).unwrap())
            .await
            .unwrap();

        let response = rx.recv().await.unwrap();
        assert_eq!(response.task_id, task_id);
        let WorkerOutcome::Success(value) = response.outcome else {
            panic!("expected success");
        };
        assert_eq!(
            decode_output(TaskKind::Summarize, value).unwrap(),
            TaskOutput::Summarize("HELLO".into())
        );
    }

    #[tokio::test]
    async fn malformed_request_reports_failure() {
        let (host, mut rx) = host();
        host.create_context().await.unwrap();
        let task_id = Uuid::new_v4();
        host.send(WorkerRequest::new(
            task_id,
            TaskKind::Rewrite,
            serde_json::json!({"nope": true}),
        ))
        .await
        .unwrap();

        let response = rx.recv().await.unwrap();
        assert!(matches!(response.outcome, WorkerOutcome::Failure(_)));
    }

    #[tokio::test]
    async fn close_unknown_context_is_not_found() {
        let (host, _rx) = host();
        let info = host.create_context().await.unwrap();
        assert!(matches!(
            host.close_context("other").await,
            Err(HostError::NotFound(_))
        ));
        host.close_context(&info.id).await.unwrap();
        assert!(host.list_contexts().await.unwrap().is_empty());
    }
}
