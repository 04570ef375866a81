mod event;
mod progress;
mod run;
mod step;

pub use event::{
    EventStatus, PipelineEvent, TestResult, TestStep, ToolExecution, ToolRow, ToolSafety,
};
pub use progress::RunProgress;
pub use run::{RunHandle, RunPhase, RunSnapshot};
pub use step::{StepData, StepStatus};
