//! Singleton worker context lifecycle.
//!
//! At most one context exists per manager. Concurrent callers share a single
//! in-flight creation; a context already present on the host is adopted
//! instead of duplicated. Every dispatched task resolves, rejects or times
//! out, and its pending entry is removed on every exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{ErrorKind, HostError, WorkerError, WorkerFailure};
use crate::task::{Task, TaskKind, TaskOutput, TaskPayload};

use super::host::{ResponseReceiver, SandboxHost};
use super::protocol::{WorkerRequest, decode_output};
use super::state::{ContextState, WorkerContext};

type CreationFuture = Shared<BoxFuture<'static, Result<WorkerContext, WorkerError>>>;
type Responder = oneshot::Sender<Result<serde_json::Value, WorkerError>>;
type PendingTable = Mutex<HashMap<Uuid, PendingTask>>;

enum Slot {
    Absent,
    Creating {
        future: CreationFuture,
        generation: u64,
    },
    Active(WorkerContext),
    Closing,
}

impl Slot {
    fn state(&self) -> ContextState {
        match self {
            Self::Absent => ContextState::Absent,
            Self::Creating { .. } => ContextState::Creating,
            Self::Active(_) => ContextState::Active,
            Self::Closing => ContextState::Closing,
        }
    }

    /// Replace the slot with `next`, returning the previous one.
    fn transition(&mut self, next: Slot) -> Slot {
        let (from, to) = (self.state(), next.state());
        if from != to && !from.can_transition_to(to) {
            warn!(%from, %to, "Unexpected worker context transition");
        } else {
            debug!(%from, %to, "Worker context transition");
        }
        std::mem::replace(self, next)
    }
}

struct PendingTask {
    kind: TaskKind,
    dispatched_at: DateTime<Utc>,
    responder: Responder,
}

/// A task awaiting its result.
#[derive(Debug, Clone, Serialize)]
pub struct PendingTaskInfo {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub dispatched_at: DateTime<Utc>,
}

/// Removes a pending entry when the dispatching future ends for any reason.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    task_id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.task_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct WorkerLifecycleManager {
    host: Arc<dyn SandboxHost>,
    config: WorkerConfig,
    slot: Arc<Mutex<Slot>>,
    generation: AtomicU64,
    pending: Arc<PendingTable>,
    router: JoinHandle<()>,
}

impl WorkerLifecycleManager {
    /// Must be called inside a tokio runtime; spawns the response router.
    pub fn new(host: Arc<dyn SandboxHost>, responses: ResponseReceiver, config: WorkerConfig) -> Self {
        let pending: Arc<PendingTable> = Arc::new(Mutex::new(HashMap::new()));
        let router = tokio::spawn(route_responses(responses, Arc::downgrade(&pending)));
        Self {
            host,
            config,
            slot: Arc::new(Mutex::new(Slot::Absent)),
            generation: AtomicU64::new(0),
            pending,
            router,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> ContextState {
        lock(&self.slot).state()
    }

    pub fn context(&self) -> Option<WorkerContext> {
        match &*lock(&self.slot) {
            Slot::Active(context) => Some(context.clone()),
            _ => None,
        }
    }

    pub fn context_id(&self) -> Option<String> {
        self.context().map(|c| c.id)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn pending_tasks(&self) -> Vec<PendingTaskInfo> {
        let mut tasks: Vec<_> = lock(&self.pending)
            .iter()
            .map(|(id, task)| PendingTaskInfo {
                task_id: *id,
                kind: task.kind,
                dispatched_at: task.dispatched_at,
            })
            .collect();
        tasks.sort_by_key(|t| t.dispatched_at);
        tasks
    }

    /// Ensure the context exists, creating or adopting it at most once.
    pub async fn create_context(&self) -> Result<WorkerContext, WorkerError> {
        let future = {
            let mut slot = lock(&self.slot);
            match &*slot {
                Slot::Active(context) => return Ok(context.clone()),
                Slot::Creating { future, .. } => future.clone(),
                Slot::Closing => {
                    return Err(WorkerError::ContextUnavailable(
                        "worker context is closing".into(),
                    ));
                }
                Slot::Absent => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = establish(
                        Arc::clone(&self.host),
                        Arc::clone(&self.slot),
                        generation,
                    )
                    .boxed()
                    .shared();
                    slot.transition(Slot::Creating {
                        future: future.clone(),
                        generation,
                    });
                    future
                }
            }
        };
        future.await
    }

    /// Dispatch a task into the context and wait for its result.
    ///
    /// Rejects immediately with `QueueFull` when the pending table is at
    /// capacity. `timeout` defaults to the configured task timeout and covers
    /// context creation, dispatch and the wait for the result.
    pub async fn execute_task(
        &self,
        kind: TaskKind,
        data: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, WorkerError> {
        self.dispatch(Uuid::new_v4(), kind, data, timeout).await
    }

    async fn dispatch(
        &self,
        task_id: Uuid,
        kind: TaskKind,
        data: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, WorkerError> {
        let timeout = timeout.unwrap_or(self.config.task_timeout);
        let (responder, receiver) = oneshot::channel();

        {
            let mut pending = lock(&self.pending);
            if pending.len() >= self.config.max_pending_tasks {
                warn!(
                    max = self.config.max_pending_tasks,
                    %kind,
                    "Worker queue full, rejecting task"
                );
                return Err(WorkerError::QueueFull {
                    max: self.config.max_pending_tasks,
                });
            }
            pending.insert(
                task_id,
                PendingTask {
                    kind,
                    dispatched_at: Utc::now(),
                    responder,
                },
            );
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            task_id,
        };

        let dispatch = async {
            self.create_context().await?;
            self.host
                .send(WorkerRequest::new(task_id, kind, data))
                .await?;
            debug!(%task_id, %kind, "Dispatched worker task");
            receiver
                .await
                .unwrap_or(Err(WorkerError::Cancelled { task_id }))
        };

        match tokio::time::timeout(timeout, dispatch).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%task_id, %kind, ?timeout, "Worker task timed out");
                Err(WorkerError::Timeout { task_id, timeout })
            }
        }
    }

    /// Run `payload` as a new task.
    pub async fn execute(&self, payload: &TaskPayload) -> Result<TaskOutput, WorkerError> {
        self.submit(&Task::new(payload.clone())).await
    }

    /// Run a caller-built task. Its id is the one carried across the context
    /// boundary and listed in [`pending_tasks`](Self::pending_tasks).
    pub async fn submit(&self, task: &Task) -> Result<TaskOutput, WorkerError> {
        let kind = task.kind();
        let data = serde_json::to_value(&task.payload).map_err(|e| {
            WorkerError::Task(WorkerFailure {
                kind: ErrorKind::InvalidInput,
                message: format!("failed to encode {kind} payload: {e}"),
                retryable: false,
            })
        })?;
        let value = self.dispatch(task.id, kind, data, None).await?;
        decode_output(kind, value)
    }

    /// Reject every pending task with `Cancelled`. Returns how many there were.
    pub fn cancel_all_tasks(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        let count = drained.len();
        for (task_id, task) in drained {
            let _ = task.responder.send(Err(WorkerError::Cancelled { task_id }));
        }
        if count > 0 {
            info!(count, "Cancelled pending worker tasks");
        }
        count
    }

    /// Cancel pending work and tear the context down.
    ///
    /// The manager ends in `Absent` even if the host fails to close.
    pub async fn close_context(&self) {
        self.cancel_all_tasks();

        let previous = {
            let mut slot = lock(&self.slot);
            self.generation.fetch_add(1, Ordering::SeqCst);
            slot.transition(Slot::Closing)
        };

        if let Slot::Active(context) = previous {
            match self.host.close_context(&context.id).await {
                Ok(()) => info!(context_id = %context.id, "Closed worker context"),
                Err(e) => warn!(
                    context_id = %context.id,
                    error = %e,
                    "Worker context teardown failed, resetting anyway"
                ),
            }
        }

        lock(&self.slot).transition(Slot::Absent);
    }
}

impl Drop for WorkerLifecycleManager {
    fn drop(&mut self) {
        self.router.abort();
    }
}

/// Create or adopt the context, then publish it if no close intervened.
async fn establish(
    host: Arc<dyn SandboxHost>,
    slot: Arc<Mutex<Slot>>,
    generation: u64,
) -> Result<WorkerContext, WorkerError> {
    let result = find_or_create(host.as_ref()).await;

    let mut current = lock(&slot);
    if let Slot::Creating { generation: g, .. } = &*current
        && *g == generation
    {
        current.transition(match &result {
            Ok(context) => Slot::Active(context.clone()),
            Err(_) => Slot::Absent,
        });
    }
    result
}

async fn find_or_create(host: &dyn SandboxHost) -> Result<WorkerContext, WorkerError> {
    match host.list_contexts().await {
        Ok(existing) => {
            if let Some(info) = existing.into_iter().next() {
                info!(context_id = %info.id, "Adopting existing worker context");
                return Ok(WorkerContext::adopted(info));
            }
        }
        Err(e) => warn!(error = %e, "Listing worker contexts failed, creating one"),
    }

    match host.create_context().await {
        Ok(info) => {
            info!(context_id = %info.id, "Created worker context");
            Ok(WorkerContext::created(info))
        }
        Err(HostError::AlreadyExists) => {
            let info = host.list_contexts().await?.into_iter().next().ok_or_else(|| {
                WorkerError::ContextUnavailable(
                    "host reported an existing context but listed none".into(),
                )
            })?;
            info!(context_id = %info.id, "Worker context appeared concurrently, adopting");
            Ok(WorkerContext::adopted(info))
        }
        Err(e) => {
            warn!(error = %e, "Worker context creation failed");
            Err(e.into())
        }
    }
}

async fn route_responses(mut responses: ResponseReceiver, pending: Weak<PendingTable>) {
    while let Some(response) = responses.recv().await {
        let Some(pending) = pending.upgrade() else {
            break;
        };
        let task = lock(&pending).remove(&response.task_id);
        match task {
            Some(task) => {
                let _ = task.responder.send(response.outcome.into_result());
            }
            None => debug!(
                task_id = %response.task_id,
                "Dropping result for unknown or expired worker task"
            ),
        }
    }
    debug!("Worker response channel closed");
}
