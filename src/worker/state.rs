//! Worker context state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::protocol::ContextInfo;

/// Lifecycle of the singleton worker context.
///
/// `Absent → Creating → Active → Closing → Absent`. A failed creation goes
/// back to `Absent`; closing from `Creating` abandons the creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    Absent,
    Creating,
    Active,
    Closing,
}

impl ContextState {
    pub fn can_transition_to(&self, target: ContextState) -> bool {
        use ContextState::*;

        matches!(
            (self, target),
            (Absent, Creating)
                | (Absent, Closing)
                | (Creating, Active)
                | (Creating, Absent)
                | (Creating, Closing)
                | (Active, Closing)
                | (Closing, Absent)
        )
    }
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Closing => "closing",
        };
        write!(f, "{s}")
    }
}

/// The live context, as tracked by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerContext {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Found on the host rather than created by this manager.
    pub adopted: bool,
}

impl WorkerContext {
    pub fn created(info: ContextInfo) -> Self {
        Self {
            id: info.id,
            created_at: info.created_at,
            adopted: false,
        }
    }

    pub fn adopted(info: ContextInfo) -> Self {
        Self {
            id: info.id,
            created_at: info.created_at,
            adopted: true,
        }
    }
}
