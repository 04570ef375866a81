use serde::{Deserialize, Serialize};

use crate::registry::PIPELINE_STEP_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Running,
    Done,
    Error,
    /// Any status string the decoder does not recognise.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Running => write!(f, "running"),
            EventStatus::Done => write!(f, "done"),
            EventStatus::Error => write!(f, "error"),
            EventStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// One progress record emitted by the remote pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    pub step: String,
    pub status: EventStatus,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_rows: Option<Vec<ToolRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

impl PipelineEvent {
    pub fn new(step: impl Into<String>, status: EventStatus) -> Self {
        Self {
            step: step.into(),
            status,
            items: Vec::new(),
            sandbox: None,
            tool_rows: None,
            test_results: None,
            passed: None,
            total: None,
        }
    }

    pub fn with_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items = items.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this event describes the run as a whole rather than a stage.
    pub fn is_meta(&self) -> bool {
        self.step == PIPELINE_STEP_ID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolSafety {
    #[serde(alias = "read")]
    Read,
    #[serde(alias = "write")]
    Write,
    #[serde(alias = "destructive")]
    Destructive,
    #[serde(alias = "enabled")]
    Enabled,
}

impl std::fmt::Display for ToolSafety {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolSafety::Read => write!(f, "Read"),
            ToolSafety::Write => write!(f, "Write"),
            ToolSafety::Destructive => write!(f, "Destructive"),
            ToolSafety::Enabled => write!(f, "Enabled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolExecution {
    #[serde(rename = "Auto Execute", alias = "AutoExecute")]
    AutoExecute,
    #[serde(rename = "Requires Approval", alias = "RequiresApproval")]
    RequiresApproval,
}

impl std::fmt::Display for ToolExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolExecution::AutoExecute => write!(f, "Auto Execute"),
            ToolExecution::RequiresApproval => write!(f, "Requires Approval"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRow {
    pub name: String,
    pub method: String,
    pub path: String,
    pub safety: ToolSafety,
    pub execution: ToolExecution,
    pub rate_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    pub action: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    #[serde(default)]
    pub description: String,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub steps: Vec<TestStep>,
}
