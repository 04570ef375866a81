use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::{StepData, StepStatus};

/// Opaque identifier the remote pipeline assigns to an accepted run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHandle(String);

impl RunHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Starting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl RunPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, RunPhase::Starting | RunPhase::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::Cancelled | RunPhase::Failed
        )
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Starting => write!(f, "starting"),
            RunPhase::Streaming => write!(f, "streaming"),
            RunPhase::Completed => write!(f, "completed"),
            RunPhase::Cancelled => write!(f, "cancelled"),
            RunPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time copy of everything a presentation layer renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub phase: RunPhase,
    pub is_running: bool,
    pub run_handle: Option<RunHandle>,
    pub active_ordinal: usize,
    pub viewed_ordinal: usize,
    pub completed: BTreeSet<usize>,
    pub following: bool,
    pub step_data: BTreeMap<usize, StepData>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    pub fn step(&self, ordinal: usize) -> Option<&StepData> {
        self.step_data.get(&ordinal)
    }

    /// Reported status of a stage, `Pending` if nothing has been heard yet.
    pub fn step_status(&self, ordinal: usize) -> StepStatus {
        self.step(ordinal)
            .map(|data| data.status)
            .unwrap_or_default()
    }

    pub fn is_completed(&self, ordinal: usize) -> bool {
        self.completed.contains(&ordinal)
    }

    pub fn duration_secs(&self) -> Option<i64> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some((end - started).num_seconds())
    }
}
