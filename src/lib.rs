//! AI Learn — orchestration core for AI learning tasks.

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod task;
pub mod worker;

pub use config::OrchestratorConfig;
pub use error::{Error, ErrorKind, Result};
pub use orchestrator::{LearningOrchestrator, TextAnalysis};
pub use task::{TaskKind, TaskOutput, TaskPayload};
