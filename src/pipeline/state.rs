//! Pipeline run state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage of a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Input accepted and conversation id assigned.
    Received,
    /// Format and intent decided.
    Classified,
    /// Exactly one extraction record exists.
    Extracted,
    /// Action decided.
    Routed,
    /// Context written to the store.
    Persisted,
    /// Envelope returned to the caller.
    Responded,
    /// Unrecoverable I/O failure.
    Failed,
}

impl PipelineStage {
    /// Stages advance strictly in order; any non-terminal stage may fail.
    pub fn can_transition_to(&self, target: PipelineStage) -> bool {
        use PipelineStage::*;

        matches!(
            (self, target),
            (Received, Classified)
                | (Classified, Extracted)
                | (Extracted, Routed)
                | (Routed, Persisted)
                | (Persisted, Responded)
                | (Received | Classified | Extracted | Routed | Persisted, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Responded | Self::Failed)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Extracted => "extracted",
            Self::Routed => "routed",
            Self::Persisted => "persisted",
            Self::Responded => "responded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A recorded stage change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: PipelineStage,
    pub to: PipelineStage,
    pub timestamp: DateTime<Utc>,
}

/// Tracks one run through the stages.
#[derive(Debug, Clone)]
pub struct RunState {
    pub conversation_id: Uuid,
    pub stage: PipelineStage,
    pub transitions: Vec<StageTransition>,
}

impl RunState {
    /// Start a run with a fresh conversation id.
    pub fn received() -> Self {
        Self {
            conversation_id: Uuid::new_v4(),
            stage: PipelineStage::Received,
            transitions: Vec::new(),
        }
    }

    pub fn transition_to(&mut self, next: PipelineStage) -> Result<(), String> {
        if !self.stage.can_transition_to(next) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.stage, next
            ));
        }
        self.transitions.push(StageTransition {
            from: self.stage,
            to: next,
            timestamp: Utc::now(),
        });
        self.stage = next;
        Ok(())
    }
}
