//! Folds pipeline events into derived run state.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{EventStatus, PipelineEvent, RunProgress, StepData, StepStatus};
use crate::registry::StepRegistry;

const FALLBACK_RUN_ERROR: &str = "Pipeline failed";

/// Progress plus per-stage detail for a single run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RunState {
    pub progress: RunProgress,
    pub steps: BTreeMap<usize, StepData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnmappedStep,
    MetaEvent,
}

/// What applying a single event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOutcome {
    StepUpdated { ordinal: usize, status: StepStatus },
    RunFailed,
    Ignored(IgnoreReason),
}

impl RunState {
    /// Fresh state for an acknowledged run.
    pub fn started(registry: &StepRegistry) -> Self {
        Self {
            progress: RunProgress::started(registry),
            steps: BTreeMap::new(),
        }
    }

    /// State left behind by a run that never got past acknowledgement.
    pub fn failed(cause: impl Into<String>) -> Self {
        let mut state = Self::default();
        state.progress.error = Some(cause.into());
        state
    }

    pub fn apply(&mut self, registry: &StepRegistry, event: &PipelineEvent) -> ReduceOutcome {
        if event.is_meta() {
            return self.apply_meta(event);
        }

        let Some(ordinal) = registry.index_of(&event.step) else {
            return ReduceOutcome::Ignored(IgnoreReason::UnmappedStep);
        };

        self.steps.entry(ordinal).or_default().merge(event);

        let max = registry.max_ordinal();
        match event.status {
            EventStatus::Running | EventStatus::Unknown => {
                self.progress.advance_to(ordinal.min(max));
            }
            EventStatus::Done => {
                self.progress.completed.insert(ordinal);
                // The next stage becomes active before it reports anything.
                self.progress.advance_to((ordinal + 1).min(max));
            }
            EventStatus::Error => {}
        }

        ReduceOutcome::StepUpdated {
            ordinal,
            status: event.status.into(),
        }
    }

    fn apply_meta(&mut self, event: &PipelineEvent) -> ReduceOutcome {
        match event.status {
            EventStatus::Error => {
                let message = if event.items.is_empty() {
                    FALLBACK_RUN_ERROR.to_string()
                } else {
                    event.items.join("\n")
                };
                self.progress.error = Some(message);
                ReduceOutcome::RunFailed
            }
            _ => ReduceOutcome::Ignored(IgnoreReason::MetaEvent),
        }
    }
}

/// Functional form of [`RunState::apply`].
pub fn reduce(mut state: RunState, registry: &StepRegistry, event: &PipelineEvent) -> RunState {
    state.apply(registry, event);
    state
}
