use serde::{Deserialize, Serialize};

use super::event::{EventStatus, PipelineEvent, TestResult, ToolRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Done,
    Error,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Done => write!(f, "done"),
            StepStatus::Error => write!(f, "error"),
        }
    }
}

impl From<EventStatus> for StepStatus {
    fn from(status: EventStatus) -> Self {
        match status {
            EventStatus::Done => StepStatus::Done,
            EventStatus::Error => StepStatus::Error,
            EventStatus::Running | EventStatus::Unknown => StepStatus::Running,
        }
    }
}

/// Latest reported detail for one stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StepData {
    pub items: Vec<String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_rows: Option<Vec<ToolRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

impl StepData {
    /// Overwrites items and status; optional payloads only when the event carries them.
    pub fn merge(&mut self, event: &PipelineEvent) {
        self.items = event.items.clone();
        self.status = event.status.into();

        if let Some(rows) = &event.tool_rows {
            self.tool_rows = Some(rows.clone());
        }
        if let Some(results) = &event.test_results {
            self.test_results = Some(results.clone());
        }
        if let Some(passed) = event.passed {
            self.passed = Some(passed);
        }
        if let Some(total) = event.total {
            self.total = Some(total);
        }
        if let Some(sandbox) = &event.sandbox {
            self.sandbox = Some(sandbox.clone());
        }
    }
}
