//! Messages crossing the worker-context boundary.
//!
//! Both directions are plain serde types, so a host can carry them over any
//! transport (a channel in-process, JSON over a pipe, a browser message port).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, WorkerError, WorkerFailure};
use crate::task::{TaskKind, TaskOutput, TaskPayload};

/// A task dispatched into the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub data: serde_json::Value,
}

impl WorkerRequest {
    pub fn new(task_id: Uuid, kind: TaskKind, data: serde_json::Value) -> Self {
        Self { task_id, kind, data }
    }

    pub fn from_payload(task_id: Uuid, payload: &TaskPayload) -> Result<Self, serde_json::Error> {
        Ok(Self {
            task_id,
            kind: payload.kind(),
            data: serde_json::to_value(payload)?,
        })
    }

    /// Decode `data` back into a payload. The payload's kind must match `kind`.
    pub fn payload(&self) -> Result<TaskPayload, WorkerFailure> {
        let payload: TaskPayload = serde_json::from_value(self.data.clone()).map_err(|e| WorkerFailure {
            kind: ErrorKind::InvalidInput,
            message: format!("malformed {} payload: {e}", self.kind),
            retryable: false,
        })?;
        if payload.kind() != self.kind {
            return Err(WorkerFailure {
                kind: ErrorKind::InvalidInput,
                message: format!("request kind {} carries a {} payload", self.kind, payload.kind()),
                retryable: false,
            });
        }
        Ok(payload)
    }
}

/// Result of one task, reported back from the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Success(serde_json::Value),
    Failure(WorkerFailure),
}

impl WorkerOutcome {
    pub fn into_result(self) -> Result<serde_json::Value, WorkerError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(WorkerError::Task(failure)),
        }
    }
}

/// A result message matched to its request by `task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub task_id: Uuid,
    pub outcome: WorkerOutcome,
}

impl WorkerResponse {
    pub fn success(task_id: Uuid, value: serde_json::Value) -> Self {
        Self {
            task_id,
            outcome: WorkerOutcome::Success(value),
        }
    }

    pub fn failure(task_id: Uuid, failure: WorkerFailure) -> Self {
        Self {
            task_id,
            outcome: WorkerOutcome::Failure(failure),
        }
    }
}

/// A context as the host describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Decode a successful result into a typed output of the expected kind.
pub fn decode_output(kind: TaskKind, value: serde_json::Value) -> Result<TaskOutput, WorkerError> {
    let output: TaskOutput = serde_json::from_value(value).map_err(|e| {
        WorkerError::Task(WorkerFailure {
            kind: ErrorKind::ProcessingFailed,
            message: format!("malformed {kind} result: {e}"),
            retryable: false,
        })
    })?;
    if output.kind() != kind {
        return Err(WorkerError::Task(WorkerFailure {
            kind: ErrorKind::ProcessingFailed,
            message: format!("expected a {kind} result, got {}", output.kind()),
            retryable: false,
        }));
    }
    Ok(output)
}
