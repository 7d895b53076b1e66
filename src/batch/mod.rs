//! Concurrency-bounded batch processing.
//!
//! - `limiter` — FIFO counting semaphore shared by every batch workflow
//! - `vocabulary` — vocabulary analysis + translation in fixed-size batches

pub mod limiter;
pub mod vocabulary;

pub use limiter::{ConcurrencyLimiter, Permit};
pub use vocabulary::{
    BatchProgress, ProgressObserver, VocabularyBatchOutcome, VocabularyBatchProcessor,
    VocabularyRequest, dedupe_words,
};
