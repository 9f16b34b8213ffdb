//! Per-table lifecycle.

use schemars::JsonSchema;
use serde::Serialize;
use std::fmt;

/// Lifecycle of one table within a run.
///
/// ```text
/// PENDING -> GENERATING -> INSERTING -> VERIFYING -> DONE
///                                   \-------------> DONE   (verify off)
/// FAILED from any state but DONE; INTERRUPTED on cancellation.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    Pending,
    Generating,
    Inserting,
    Verifying,
    Done,
    Failed,
    Interrupted,
}

impl TableState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TableState::Done | TableState::Failed | TableState::Interrupted
        )
    }

    pub fn can_transition_to(self, next: TableState) -> bool {
        use TableState::*;
        match (self, next) {
            (Pending, Generating) => true,
            (Generating, Inserting) => true,
            (Inserting, Verifying) | (Inserting, Done) => true,
            (Verifying, Done) => true,
            (from, Failed) => !matches!(from, Done | Failed),
            (from, Interrupted) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableState::Pending => "PENDING",
            TableState::Generating => "GENERATING",
            TableState::Inserting => "INSERTING",
            TableState::Verifying => "VERIFYING",
            TableState::Done => "DONE",
            TableState::Failed => "FAILED",
            TableState::Interrupted => "INTERRUPTED",
        };
        f.write_str(s)
    }
}
