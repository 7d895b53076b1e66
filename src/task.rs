//! Task types — what callers ask the orchestrator to do.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The five supported task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    DetectLanguage,
    Summarize,
    Rewrite,
    Translate,
    AnalyzeVocabulary,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DetectLanguage => "detect_language",
            Self::Summarize => "summarize",
            Self::Rewrite => "rewrite",
            Self::Translate => "translate",
            Self::AnalyzeVocabulary => "analyze_vocabulary",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target length for a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl SummaryLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }

    /// Rough sentence budget used in prompts.
    pub fn sentence_budget(&self) -> usize {
        match self {
            Self::Short => 2,
            Self::Medium => 4,
            Self::Long => 8,
        }
    }
}

/// Reader level for rewrites and vocabulary difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" | "easy" => Ok(Self::Beginner),
            "intermediate" | "medium" => Ok(Self::Intermediate),
            "advanced" | "hard" => Ok(Self::Advanced),
            other => Err(format!("unknown difficulty '{other}'")),
        }
    }
}

/// Input for one task. The variant determines the [`TaskKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    DetectLanguage {
        text: String,
    },
    Summarize {
        text: String,
        length: SummaryLength,
    },
    Rewrite {
        text: String,
        difficulty: Difficulty,
    },
    Translate {
        text: String,
        from: String,
        to: String,
    },
    AnalyzeVocabulary {
        words: Vec<String>,
        language: String,
    },
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::DetectLanguage { .. } => TaskKind::DetectLanguage,
            Self::Summarize { .. } => TaskKind::Summarize,
            Self::Rewrite { .. } => TaskKind::Rewrite,
            Self::Translate { .. } => TaskKind::Translate,
            Self::AnalyzeVocabulary { .. } => TaskKind::AnalyzeVocabulary,
        }
    }
}

/// A caller-owned unit of work. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub payload: TaskPayload,
}

impl Task {
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }
}

/// Detected language with a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetection {
    /// ISO 639-1 code, lowercase.
    pub language: String,
    pub confidence: f32,
}

/// One analyzed vocabulary word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub word: String,
    pub definition: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

/// Output of one task. Mirrors [`TaskPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskOutput {
    DetectLanguage(LanguageDetection),
    Summarize(String),
    Rewrite(String),
    Translate(String),
    AnalyzeVocabulary(Vec<VocabularyItem>),
}

impl TaskOutput {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::DetectLanguage(_) => TaskKind::DetectLanguage,
            Self::Summarize(_) => TaskKind::Summarize,
            Self::Rewrite(_) => TaskKind::Rewrite,
            Self::Translate(_) => TaskKind::Translate,
            Self::AnalyzeVocabulary(_) => TaskKind::AnalyzeVocabulary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_matches_variant() {
        let payload = TaskPayload::Translate {
            text: "hola".into(),
            from: "es".into(),
            to: "en".into(),
        };
        assert_eq!(payload.kind(), TaskKind::Translate);
        assert_eq!(Task::new(payload).kind(), TaskKind::Translate);
    }

    #[test]
    fn payload_wire_format_is_tagged() {
        let payload = TaskPayload::Summarize {
            text: "Some text.".into(),
            length: SummaryLength::Short,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "summarize");
        assert_eq!(json["length"], "short");
    }

    #[test]
    fn output_wire_format_is_adjacently_tagged() {
        let output = TaskOutput::Rewrite("Easy text.".into());
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "rewrite");
        assert_eq!(json["value"], "Easy text.");
    }

    #[test]
    fn difficulty_parses_aliases() {
        assert_eq!("Easy".parse::<Difficulty>().unwrap(), Difficulty::Beginner);
        assert_eq!(" advanced ".parse::<Difficulty>().unwrap(), Difficulty::Advanced);
        assert!("expert".parse::<Difficulty>().is_err());
    }

    #[test]
    fn vocabulary_item_tolerates_missing_optionals() {
        let item: VocabularyItem =
            serde_json::from_str(r#"{"word": "ubiquitous", "definition": "found everywhere"}"#)
                .unwrap();
        assert_eq!(item.difficulty, Difficulty::Intermediate);
        assert!(item.translation.is_none());
    }
}
