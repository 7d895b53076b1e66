//! Sentence-bounded chunking.
//!
//! Content is split on sentence boundaries and sentences are accumulated into
//! chunks up to a character target or a sentence count, whichever comes
//! first. A sentence is never split; one longer than the target becomes a
//! chunk of its own.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::VocabularyItem;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}[\p{L}'’\-]*\p{L}|\p{L}").expect("word pattern is valid"));

/// Characters that end a sentence.
const TERMINATORS: &[char] = &['.', '!', '?', '…', '。', '！', '？'];

const FULL_WIDTH: &[char] = &['。', '！', '？'];

/// Characters that may trail a terminator and still belong to the sentence.
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', ']', '»'];

/// Chunk size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    /// Soft character target per chunk.
    pub target_chars: usize,
    /// Hard cap on sentences per chunk.
    pub max_sentences: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            target_chars: 800,
            max_sentences: 8,
        }
    }
}

/// Artifacts attached to a chunk once every operation succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkArtifacts {
    pub summary: Option<String>,
    pub rewrite: Option<String>,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyItem>,
}

/// A sentence-bounded unit of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub content: String,
    /// 0-based position in the source text.
    pub order: usize,
    pub processed: bool,
    pub artifacts: ChunkArtifacts,
}

impl Chunk {
    pub fn new(content: impl Into<String>, order: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            order,
            processed: false,
            artifacts: ChunkArtifacts::default(),
        }
    }
}

/// Split `text` into trimmed, non-empty sentences.
///
/// A boundary is a terminator (plus any closing quotes or brackets) followed
/// by whitespace or the end of text, or a blank line.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let boundary_end = if TERMINATORS.contains(&c) {
            let mut end = idx + c.len_utf8();
            while let Some(&(next_idx, next)) = chars.peek() {
                if TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                    end = next_idx + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek() {
                None => Some(end),
                Some(&(_, next)) if next.is_whitespace() => Some(end),
                // Full-width terminators need no trailing space.
                Some(_) if FULL_WIDTH.contains(&c) => Some(end),
                _ => None,
            }
        } else if c == '\n' && matches!(chars.peek(), Some(&(_, '\n'))) {
            Some(idx)
        } else {
            None
        };

        if let Some(end) = boundary_end {
            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece);
    }
}

/// Build chunks from `text`. Orders are 0-based and contiguous.
pub fn create_chunks(text: &str, options: &ChunkOptions) -> Vec<Chunk> {
    let target = options.target_chars.max(1);
    let max_sentences = options.max_sentences.max(1);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;
    let mut sentences = 0;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        let would_overflow = current_chars + 1 + len > target;
        if sentences > 0 && (would_overflow || sentences >= max_sentences) {
            chunks.push(Chunk::new(std::mem::take(&mut current), chunks.len()));
            current_chars = 0;
            sentences = 0;
        }
        if sentences > 0 {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(sentence);
        current_chars += len;
        sentences += 1;
    }
    if sentences > 0 {
        chunks.push(Chunk::new(current, chunks.len()));
    }
    chunks
}

/// Pick up to `limit` distinct candidate vocabulary words from `text`, in
/// order of first appearance. Words shorter than `min_chars` are skipped.
pub fn candidate_words(text: &str, min_chars: usize, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    WORD.find_iter(text)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() >= min_chars)
        .filter(|w| seen.insert(w.to_lowercase()))
        .take(limit)
        .map(str::to_string)
        .collect()
}
