#![allow(clippy::manual_range_contains, clippy::derivable_impls)]

pub mod backend;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod models;
pub mod navigation;
pub mod reducer;
pub mod registry;

pub use backend::{ByteStream, HttpPipelineBackend, PipelineBackend};
pub use config::{
    get_config_dir, ConfigLoadError, DisplayConfig, LoggingConfig, ServerConfig, StreamConfig,
    TestPilotConfig,
};
pub use controller::{normalize_identifiers, RunController};
pub use decoder::{decode_stream, EventDecoder, DEFAULT_EVENT_PREFIX};
pub use error::{CliErrorDisplay, TestPilotError, TestPilotResult};
pub use models::{
    EventStatus, PipelineEvent, RunHandle, RunPhase, RunProgress, RunSnapshot, StepData,
    StepStatus, TestResult, TestStep, ToolExecution, ToolRow, ToolSafety,
};
pub use navigation::NavigationState;
pub use reducer::{reduce, IgnoreReason, ReduceOutcome, RunState};
pub use registry::{StepMeta, StepRegistry, PIPELINE_STEPS, PIPELINE_STEP_ID};
