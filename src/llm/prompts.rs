//! Prompt construction and response parsing for every task kind.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::task::{Difficulty, LanguageDetection, SummaryLength, VocabularyItem};

/// Line-anchored `[n]` marker used by batch translation.
static INDEX_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\[(\d+)\][ \t]*").expect("index marker pattern is valid")
});

// ── Prompt construction ─────────────────────────────────────────────

pub fn detect_language_system() -> String {
    "You identify the language of a text.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"language\": \"<ISO 639-1 code>\", \"confidence\": 0.0}\n\n\
     Rules:\n\
     - Use the two-letter lowercase code (en, es, fr, de, ...)\n\
     - confidence is between 0.0 and 1.0"
        .to_string()
}

pub fn summarize_system(length: SummaryLength) -> String {
    format!(
        "You summarize texts for language learners.\n\n\
         Write a {} summary of at most {} sentences in the same language as the text. \
         Respond with the summary only, no preamble.",
        length.as_str(),
        length.sentence_budget()
    )
}

pub fn rewrite_system(difficulty: Difficulty) -> String {
    let guidance = match difficulty {
        Difficulty::Beginner => {
            "Use short sentences, the most common words and present tense where possible."
        }
        Difficulty::Intermediate => {
            "Keep everyday vocabulary, simplify idioms and break up long sentences."
        }
        Difficulty::Advanced => "Keep the original register; only clarify obscure passages.",
    };
    format!(
        "You rewrite texts for {difficulty} language learners. {guidance}\n\
         Keep the meaning and the language of the original. \
         Respond with the rewritten text only."
    )
}

pub fn translate_system(from: &str, to: &str) -> String {
    format!(
        "Translate the user's text from {from} to {to}. \
         Preserve meaning and tone. Respond with the translation only."
    )
}

pub fn translate_batch_system(from: &str, to: &str) -> String {
    format!(
        "Translate each numbered item from {from} to {to}.\n\
         Respond with one line per item, each starting with the same [n] marker as the input. \
         Do not add commentary."
    )
}

/// Number items as `[1] ...`, `[2] ...`, one per line.
pub fn translate_batch_user(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("[{}] {}", i + 1, item.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn vocabulary_system(language: &str) -> String {
    format!(
        "You explain {language} vocabulary to language learners.\n\n\
         Respond with ONLY a JSON object:\n\
         {{\"items\": [{{\"word\": \"...\", \"definition\": \"...\", \"difficulty\": \"beginner|intermediate|advanced\", \
         \"part_of_speech\": \"...\", \"example\": \"...\"}}]}}\n\n\
         Rules:\n\
         - One item per input word, in the input order\n\
         - Definitions are one short sentence\n\
         - Examples are a single sentence in {language}"
    )
}

pub fn vocabulary_user(words: &[String]) -> String {
    format!("Words:\n{}", words.join("\n"))
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    language: String,
    #[serde(default)]
    confidence: f32,
}

pub fn parse_detection(raw: &str) -> Result<LanguageDetection, String> {
    let json = extract_json_object(raw);
    let response: DetectionResponse =
        serde_json::from_str(&json).map_err(|e| format!("JSON parse error: {e}"))?;

    let language = response.language.trim().to_ascii_lowercase();
    if language.is_empty() || !language.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
        return Err(format!("invalid language code '{}'", response.language));
    }
    Ok(LanguageDetection {
        language,
        confidence: if response.confidence.is_finite() {
            response.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        },
    })
}

/// Plain-text responses: trimmed, surrounding quotes or fences removed.
pub fn parse_text(raw: &str) -> Result<String, String> {
    let mut text = raw.trim();
    if let Some(inner) = text.strip_prefix("```") {
        let inner = inner.split_once('\n').map_or("", |(_, rest)| rest);
        text = inner.strip_suffix("```").unwrap_or(inner).trim();
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }
    if text.is_empty() {
        return Err("empty response".to_string());
    }
    Ok(text.to_string())
}

#[derive(Debug, Deserialize)]
struct VocabularyResponse {
    #[serde(default)]
    items: Vec<RawVocabularyItem>,
}

#[derive(Debug, Deserialize)]
struct RawVocabularyItem {
    word: String,
    #[serde(default)]
    definition: String,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    part_of_speech: Option<String>,
    #[serde(default)]
    example: Option<String>,
}

pub fn parse_vocabulary(raw: &str) -> Result<Vec<VocabularyItem>, String> {
    let json = extract_json_object(raw);
    let response: VocabularyResponse =
        serde_json::from_str(&json).map_err(|e| format!("JSON parse error: {e}"))?;

    Ok(response
        .items
        .into_iter()
        .filter(|item| !item.word.trim().is_empty())
        .map(|item| VocabularyItem {
            word: item.word.trim().to_string(),
            definition: item.definition.trim().to_string(),
            difficulty: item
                .difficulty
                .and_then(|d| d.parse().ok())
                .unwrap_or_default(),
            part_of_speech: item.part_of_speech.filter(|s| !s.is_empty()),
            example: item.example.filter(|s| !s.is_empty()),
            translation: None,
        })
        .collect())
}

/// Split a `[n]`-marked response back into `expected` items.
///
/// Missing, empty or out-of-range markers fall back to the matching original.
/// A later duplicate marker overrides an earlier one.
pub fn parse_indexed(raw: &str, originals: &[String]) -> Vec<String> {
    let mut parsed: Vec<Option<String>> = vec![None; originals.len()];
    let markers: Vec<_> = INDEX_MARKER.captures_iter(raw).collect();

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(raw.len(), |m| m.start());
        let body = raw[whole.end()..end].trim();

        let Ok(index) = number.as_str().parse::<usize>() else {
            continue;
        };
        if index == 0 || index > originals.len() || body.is_empty() {
            continue;
        }
        parsed[index - 1] = Some(body.to_string());
    }

    parsed
        .into_iter()
        .zip(originals)
        .map(|(item, original)| item.unwrap_or_else(|| original.clone()))
        .collect()
}

/// Extract a JSON object from model output (handles markdown wrapping).
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            if let Some(end) = after.find("```") {
                let inner = after[..end].trim();
                if inner.starts_with('{') {
                    return inner.to_string();
                }
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

/// Truncate to `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
