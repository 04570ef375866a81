//! Drives a single pipeline run from submission to end of stream.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{HttpPipelineBackend, PipelineBackend};
use crate::config::TestPilotConfig;
use crate::decoder::{decode_stream, DEFAULT_EVENT_PREFIX};
use crate::error::{TestPilotError, TestPilotResult};
use crate::models::{EventStatus, PipelineEvent, RunHandle, RunPhase, RunSnapshot};
use crate::reducer::{IgnoreReason, ReduceOutcome, RunState};
use crate::registry::StepRegistry;

type EventStream = BoxStream<'static, TestPilotResult<PipelineEvent>>;

#[derive(Default)]
struct Shared {
    phase: RunPhase,
    generation: u64,
    handle: Option<RunHandle>,
    state: RunState,
    cancel: Option<CancellationToken>,
    pump: Option<JoinHandle<()>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Shared {
    fn is_current(&self, generation: u64, token: &CancellationToken) -> bool {
        self.generation == generation && !token.is_cancelled()
    }

    fn finish(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.finished_at = Some(Utc::now());
        self.cancel = None;
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Abandons a run that is still `Starting` when its `start` future is dropped.
struct StartGuard {
    shared: Arc<Mutex<Shared>>,
    generation: u64,
    token: CancellationToken,
    armed: bool,
}

impl StartGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation || shared.phase != RunPhase::Starting {
            return;
        }
        self.token.cancel();
        shared.finish(RunPhase::Cancelled);
        debug!(generation = self.generation, "Start abandoned before the stream opened");
    }
}

/// Trims identifiers and drops blank ones, failing if nothing is left.
pub fn normalize_identifiers<S: AsRef<str>>(identifiers: &[S]) -> TestPilotResult<Vec<String>> {
    let normalized: Vec<String> = identifiers
        .iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    if normalized.is_empty() {
        return Err(TestPilotError::EmptyIdentifiers);
    }
    Ok(normalized)
}

/// Owns the lifecycle of one run at a time and exposes its read model.
///
/// All state lives behind one mutex that is never held across an await.
/// Each run gets a fresh generation number and cancellation token; the event
/// pump re-checks both under the lock before applying an event, so once
/// [`cancel`](Self::cancel) or a new [`start`](Self::start) has taken the
/// lock, a superseded pump cannot mutate anything.
pub struct RunController {
    backend: Arc<dyn PipelineBackend>,
    registry: StepRegistry,
    event_prefix: String,
    shared: Arc<Mutex<Shared>>,
}

impl RunController {
    pub fn new(backend: Arc<dyn PipelineBackend>) -> Self {
        Self {
            backend,
            registry: StepRegistry::pipeline(),
            event_prefix: DEFAULT_EVENT_PREFIX.to_string(),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    pub fn from_config(config: &TestPilotConfig) -> TestPilotResult<Self> {
        let backend = HttpPipelineBackend::new(config)?;
        Ok(Self::new(Arc::new(backend)).with_event_prefix(config.stream.event_prefix.clone()))
    }

    pub fn with_event_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_prefix = prefix.into();
        self
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    /// Submits a new run and begins streaming its events in the background.
    ///
    /// Any run already in progress is cancelled first. Blank identifiers are
    /// rejected before any request is made and leave the controller as it was.
    pub async fn start<S: AsRef<str>>(&self, identifiers: &[S]) -> TestPilotResult<RunHandle> {
        let identifiers = normalize_identifiers(identifiers)?;

        if let Some(previous) = self.supersede() {
            let _ = previous.await;
        }

        let token = CancellationToken::new();
        let generation = {
            let mut shared = self.lock();
            if let Some(stale) = shared.cancel.take() {
                stale.cancel();
            }
            shared.generation += 1;
            shared.phase = RunPhase::Starting;
            shared.handle = None;
            shared.cancel = Some(token.clone());
            shared.started_at = Some(Utc::now());
            shared.finished_at = None;
            shared.generation
        };
        let guard = StartGuard {
            shared: Arc::clone(&self.shared),
            generation,
            token: token.clone(),
            armed: true,
        };

        info!(
            generation,
            identifiers = identifiers.len(),
            backend = self.backend.backend_name(),
            "Starting pipeline run"
        );

        let acknowledged = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TestPilotError::RunCancelled),
            result = self.backend.start_run(&identifiers) => result,
        };
        let handle = match acknowledged {
            Ok(handle) => handle,
            Err(err) => {
                self.fail_start(generation, &token, &err, true);
                return Err(err);
            }
        };

        {
            let mut shared = self.lock();
            if !shared.is_current(generation, &token) {
                return Err(TestPilotError::RunCancelled);
            }
            shared.handle = Some(handle.clone());
            shared.state = RunState::started(&self.registry);
        }
        info!(run_id = %handle, generation, "Run acknowledged");

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TestPilotError::RunCancelled),
            result = self.backend.open_stream(&handle) => result,
        };
        let bytes = match opened {
            Ok(bytes) => bytes,
            Err(err) => {
                self.fail_start(generation, &token, &err, false);
                return Err(err);
            }
        };

        let events = decode_stream(bytes, self.event_prefix.clone());

        let mut shared = self.lock();
        if !shared.is_current(generation, &token) {
            return Err(TestPilotError::RunCancelled);
        }
        shared.phase = RunPhase::Streaming;
        shared.pump = Some(tokio::spawn(pump_events(
            Arc::clone(&self.shared),
            self.registry,
            generation,
            token,
            handle.clone(),
            events,
        )));
        drop(shared);
        guard.disarm();

        Ok(handle)
    }

    /// Stops the active run. Returns `false` if nothing was running.
    pub fn cancel(&self) -> bool {
        let mut shared = self.lock();
        let Some(token) = shared.cancel.take() else {
            return false;
        };
        token.cancel();

        if shared.phase.is_running() {
            shared.phase = RunPhase::Cancelled;
            shared.finished_at = Some(Utc::now());
        }

        match &shared.handle {
            Some(handle) => info!(run_id = %handle, "Run cancelled"),
            None => info!("Run cancelled before acknowledgement"),
        }
        true
    }

    /// Pins the viewed stage; see [`crate::navigation::NavigationState::navigate`].
    pub fn navigate(&self, target: i64) -> usize {
        let mut shared = self.lock();
        shared.state.progress.navigation.navigate(target, &self.registry)
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let shared = self.lock();
        let progress = &shared.state.progress;

        RunSnapshot {
            phase: shared.phase,
            is_running: shared.phase.is_running(),
            run_handle: shared.handle.clone(),
            active_ordinal: progress.active_ordinal,
            viewed_ordinal: progress.viewed_ordinal(),
            completed: progress.completed.clone(),
            following: progress.is_following(),
            step_data: shared.state.steps.clone(),
            error: progress.error.clone(),
            started_at: shared.started_at,
            finished_at: shared.finished_at,
        }
    }

    fn supersede(&self) -> Option<JoinHandle<()>> {
        let mut shared = self.lock();
        if let Some(token) = shared.cancel.take() {
            token.cancel();
            if shared.phase.is_running() {
                debug!(generation = shared.generation, "Superseding active run");
                shared.phase = RunPhase::Cancelled;
                shared.finished_at = Some(Utc::now());
            }
        }
        shared.pump.take()
    }

    fn fail_start(
        &self,
        generation: u64,
        token: &CancellationToken,
        err: &TestPilotError,
        before_ack: bool,
    ) {
        err.log();

        let mut shared = self.lock();
        if !shared.is_current(generation, token) {
            return;
        }
        if before_ack {
            shared.state = RunState::failed(err.to_string());
        } else {
            shared.state.progress.error = Some(err.to_string());
        }
        shared.finish(RunPhase::Failed);
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        if let Some(token) = self.lock().cancel.take() {
            token.cancel();
        }
    }
}

async fn pump_events(
    shared: Arc<Mutex<Shared>>,
    registry: StepRegistry,
    generation: u64,
    token: CancellationToken,
    handle: RunHandle,
    mut events: EventStream,
) {
    let mut applied: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(run_id = %handle, "Event pump stopped");
                return;
            }
            next = events.next() => next,
        };

        let mut guard = lock(&shared);
        if !guard.is_current(generation, &token) {
            debug!(run_id = %handle, "Discarding event for superseded run");
            return;
        }

        match next {
            Some(Ok(event)) => {
                applied += 1;
                match guard.state.apply(&registry, &event) {
                    ReduceOutcome::StepUpdated { ordinal, status } => {
                        debug!(run_id = %handle, step = %event.step, ordinal, %status, "Applied event");
                    }
                    ReduceOutcome::RunFailed => {
                        warn!(
                            run_id = %handle,
                            error = guard.state.progress.error.as_deref().unwrap_or_default(),
                            "Pipeline reported a run failure"
                        );
                    }
                    ReduceOutcome::Ignored(IgnoreReason::UnmappedStep) => {
                        warn!(run_id = %handle, step = %event.step, "Ignoring event for unknown step");
                    }
                    ReduceOutcome::Ignored(IgnoreReason::MetaEvent) => {
                        if event.status == EventStatus::Done {
                            info!(run_id = %handle, summary = %event.items.join("; "), "Pipeline finished");
                        }
                    }
                }
            }
            Some(Err(err)) => {
                err.log();
                if guard.state.progress.error.is_none() {
                    guard.state.progress.error = Some(err.to_string());
                }
                guard.finish(RunPhase::Failed);
                return;
            }
            None => {
                let phase = if guard.state.progress.error.is_some() {
                    RunPhase::Failed
                } else {
                    RunPhase::Completed
                };
                guard.finish(phase);
                info!(run_id = %handle, %phase, events = applied, "Event stream ended");
                return;
            }
        }
    }
}
