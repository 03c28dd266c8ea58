//! Background import job: trigger once, then sample its status on a fixed
//! interval until it reports `running == false`.
//!
//! - at most one poll loop per poller; a second `start` is a no-op
//! - `resume` picks up a job already running server-side without
//!   re-triggering it
//! - `stop` cancels the loop synchronously and never fires the completion
//!   callback
//!
//! Transient sample failures are retried on the next tick up to
//! `max_consecutive_failures`; permanent ones (`Unauthorized`, client errors,
//! undecodable bodies) abort at once.


use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::bus::event_types::{
    CATEGORY_IMPORT, CATEGORY_METRICS, EVENT_IMPORT_COMPLETED, EVENT_IMPORT_FAILED,
    EVENT_IMPORT_RESUMED, EVENT_IMPORT_STARTED, EVENT_METRICS_REFRESH_REQUESTED,
};
use crate::bus::EventBus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;
/// Shortest accepted poll interval; smaller values are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Server-side view of the import job. Replaced wholesale on every sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub last_run: Option<String>,
    #[serde(default)]
    pub stats: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum PollerState {
    Idle,
    Triggering,
    Running,
    Completed,
    Failed(String),
}

impl PollerState {
    /// Whether a busy indicator should be shown.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Triggering | Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A poll loop is now running.
    Started,
    /// A trigger or loop was already in flight; nothing was done.
    AlreadyRunning,
    /// `resume` found no job running server-side.
    NotRunning,
    /// `stop` was called while the trigger or first status check was in flight.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PollerError {
    #[error("import trigger failed: {0}")]
    Trigger(#[source] ApiError),
    #[error("import status check failed: {0}")]
    Status(#[source] ApiError),
}

/// Job-control endpoints the poller needs.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn trigger_import(&self) -> Result<(), ApiError>;
    async fn import_status(&self) -> Result<JobStatus, ApiError>;
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl PollerConfig {
    /// Raise out-of-range values to the nearest usable one.
    fn clamped(mut self) -> Self {
        if self.interval < MIN_POLL_INTERVAL {
            warn!(
                interval = ?self.interval,
                min = ?MIN_POLL_INTERVAL,
                "poll interval too short, clamping"
            );
            self.interval = MIN_POLL_INTERVAL;
        }
        if self.max_consecutive_failures == 0 {
            warn!("max_consecutive_failures of 0, using 1");
            self.max_consecutive_failures = 1;
        }
        self
    }
}

pub type CompletionCallback = Arc<dyn Fn(&JobStatus) + Send + Sync>;

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    generation: u64,
    busy: bool,
    task: Option<PollTask>,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct PollerInner {
    api: Arc<dyn JobApi>,
    config: PollerConfig,
    bus: Option<Arc<EventBus>>,
    state_tx: watch::Sender<PollerState>,
    slot: Mutex<Slot>,
    last_status: RwLock<Option<JobStatus>>,
    on_complete: RwLock<Option<CompletionCallback>>,
}

impl PollerInner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PollerState) {
        let previous = self.state_tx.send_replace(state.clone());
        if previous != state {
            debug!(?previous, current = ?state, "import poller state");
        }
    }

    fn record(&self, status: JobStatus) {
        *self.last_status.write().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    fn emit(&self, category: &str, event_type: &str, payload: serde_json::Value) {
        if let Some(bus) = &self.bus {
            bus.emit(category, event_type, payload);
        }
    }

    /// Give up the slot for `generation` after a failure before the loop
    /// started. Returns false if `stop` already took it.
    fn release_failed(&self, generation: u64, message: String) -> bool {
        let mut slot = self.slot();
        if slot.generation != generation {
            return false;
        }
        slot.busy = false;
        slot.task = None;
        self.set_state(PollerState::Failed(message.clone()));
        drop(slot);
        self.emit(CATEGORY_IMPORT, EVENT_IMPORT_FAILED, json!({ "error": message }));
        true
    }

    fn finish(&self, generation: u64, status: JobStatus) {
        {
            let mut slot = self.slot();
            if slot.generation != generation {
                return;
            }
            slot.busy = false;
            slot.task = None;
            self.set_state(PollerState::Completed);
        }

        info!(last_run = ?status.last_run, "import job completed");
        self.emit(
            CATEGORY_IMPORT,
            EVENT_IMPORT_COMPLETED,
            json!({ "last_run": status.last_run, "stats": status.stats }),
        );
        self.emit(
            CATEGORY_METRICS,
            EVENT_METRICS_REFRESH_REQUESTED,
            json!({ "reason": "import_completed" }),
        );

        let callback = self
            .on_complete
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(&status);
        }
    }
}

pub struct JobStatusPoller {
    inner: Arc<PollerInner>,
}

impl JobStatusPoller {
    pub fn new(api: Arc<dyn JobApi>, config: PollerConfig, bus: Option<Arc<EventBus>>) -> Self {
        let (state_tx, _) = watch::channel(PollerState::Idle);
        Self {
            inner: Arc::new(PollerInner {
                api,
                config: config.clamped(),
                bus,
                state_tx,
                slot: Mutex::new(Slot::default()),
                last_status: RwLock::new(None),
                on_complete: RwLock::new(None),
            }),
        }
    }

    /// Register the callback fired once per completed poll loop. Replaces any
    /// previous callback.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn(&JobStatus) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_complete
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Trigger the import, then poll until it finishes.
    pub async fn start(&self) -> Result<StartOutcome, PollerError> {
        let Some(generation) = self.claim() else {
            debug!("import already in progress, ignoring start");
            return Ok(StartOutcome::AlreadyRunning);
        };
        self.inner.set_state(PollerState::Triggering);
        info!("triggering import job");

        if let Err(error) = self.inner.api.trigger_import().await {
            warn!(%error, "import trigger failed");
            self.inner.release_failed(generation, error.to_string());
            return Err(PollerError::Trigger(error));
        }

        Ok(self.launch(generation, EVENT_IMPORT_STARTED))
    }

    /// Check the job once and, if the server reports it running, poll it
    /// without re-triggering.
    pub async fn resume(&self) -> Result<StartOutcome, PollerError> {
        let Some(generation) = self.claim() else {
            return Ok(StartOutcome::AlreadyRunning);
        };

        let status = match self.inner.api.import_status().await {
            Ok(status) => status,
            Err(error) => {
                warn!(%error, "import status check on resume failed");
                self.release_idle(generation);
                return Err(PollerError::Status(error));
            }
        };

        let running = status.running;
        self.inner.record(status);
        if !running {
            self.release_idle(generation);
            return Ok(StartOutcome::NotRunning);
        }
        info!("import job already running, resuming poll");
        Ok(self.launch(generation, EVENT_IMPORT_RESUMED))
    }

    /// Cancel any trigger or poll loop in flight. Idempotent.
    pub fn stop(&self) {
        let mut slot = self.inner.slot();
        slot.generation += 1;
        let was_busy = std::mem::take(&mut slot.busy);
        if let Some(task) = slot.task.take() {
            task.cancel.cancel();
            task.handle.abort();
        }
        if was_busy {
            self.inner.set_state(PollerState::Idle);
            info!("import polling stopped");
        }
    }

    pub fn state(&self) -> PollerState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PollerState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.slot().task.is_some()
    }

    /// Most recent status sample, if any.
    pub fn last_status(&self) -> Option<JobStatus> {
        self.inner
            .last_status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn claim(&self) -> Option<u64> {
        let mut slot = self.inner.slot();
        if slot.busy {
            return None;
        }
        slot.busy = true;
        slot.generation += 1;
        Some(slot.generation)
    }

    fn release_idle(&self, generation: u64) {
        let mut slot = self.inner.slot();
        if slot.generation == generation {
            slot.busy = false;
        }
    }

    fn launch(&self, generation: u64, event_type: &str) -> StartOutcome {
        let mut slot = self.inner.slot();
        if slot.generation != generation {
            return StartOutcome::Cancelled;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(self.inner.clone(), cancel.clone(), generation));
        slot.task = Some(PollTask { cancel, handle });
        self.inner.set_state(PollerState::Running);
        drop(slot);

        self.inner.emit(CATEGORY_IMPORT, event_type, json!({}));
        StartOutcome::Started
    }
}

impl Drop for JobStatusPoller {
    fn drop(&mut self) {
        let mut slot = self.inner.slot();
        slot.generation += 1;
        if let Some(task) = slot.task.take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

async fn poll_loop(inner: Arc<PollerInner>, cancel: CancellationToken, generation: u64) {
    let mut ticker = interval(inner.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the first sample is one interval out.
    ticker.tick().await;

    let mut failures: u32 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let sample = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sample = inner.api.import_status() => sample,
        };

        match sample {
            Ok(status) => {
                failures = 0;
                let running = status.running;
                inner.record(status.clone());
                if !running {
                    inner.finish(generation, status);
                    return;
                }
                debug!("import job still running");
            }
            Err(error) if !error.is_transient() => {
                warn!(%error, "import status check failed permanently, stopping poll");
                inner.release_failed(generation, error.to_string());
                return;
            }
            Err(error) => {
                failures += 1;
                warn!(%error, failures, "import status check failed");
                if failures >= inner.config.max_consecutive_failures {
                    inner.release_failed(
                        generation,
                        format!("status check failed {failures} times in a row: {error}"),
                    );
                    return;
                }
            }
        }
    }
}
