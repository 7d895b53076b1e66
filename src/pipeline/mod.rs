//! Progressive content processing.
//!
//! Long content flows through:
//! 1. `create_chunks()` — sentence-bounded chunks
//! 2. `ArtifactService` — cache-first summary, rewrite and vocabulary per chunk
//! 3. `ChunkProcessor` — concurrency-bounded run that fills chunks in place

pub mod artifacts;
pub mod chunk;
pub mod processor;

pub use artifacts::{ArtifactService, Cached};
pub use chunk::{
    Chunk, ChunkArtifacts, ChunkOptions, candidate_words, create_chunks, split_sentences,
};
pub use processor::{ChunkObserver, ChunkProcessor, ChunkProgress, ChunkRunReport, ChunkTaskOptions};
