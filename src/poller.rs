//! Scheduled polling loop
//!
//! Every `interval` the loop runs one cycle: fetch, parse, record. The first
//! cycle fires one full interval after start. Cycles never overlap, per-cycle
//! errors are logged and counted but never stop the loop, and cancellation is
//! only observed between cycles, so an in-flight fetch always completes.
//!
//! ```text
//! Idle --spawn--> Running --cancel--> Stopped
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult, CycleError, FetchStage};
use crate::fetcher::Fetch;
use crate::metrics::Metrics;
use crate::parser::parse_value;

/// Lifecycle state of a [`PollLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Constructed, not yet started
    Idle,
    /// Timer armed, cycles executing on each tick
    Running,
    /// Stop signal observed; terminal
    Stopped,
}

/// Result of one cycle
#[derive(Debug)]
pub enum CycleOutcome {
    Success { value: i64 },
    Failure { stage: FetchStage, cause: CycleError },
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Success { .. })
    }
}

/// The polling scheduler
///
/// Owns the fetcher and a clone of the metrics sink. Construct with
/// [`PollLoop::new`], then start with [`PollLoop::spawn`].
pub struct PollLoop {
    fetcher: Arc<dyn Fetch>,
    metrics: Metrics,
    interval: Duration,
    state: watch::Sender<PollState>,
}

impl PollLoop {
    /// Create an idle poll loop
    ///
    /// # Errors
    ///
    /// Returns an error if `interval` is zero; nothing is spawned in that case.
    pub fn new(fetcher: Arc<dyn Fetch>, metrics: Metrics, interval: Duration) -> AppResult<Self> {
        if interval.is_zero() {
            return Err(AppError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        let (state, _) = watch::channel(PollState::Idle);

        Ok(Self {
            fetcher,
            metrics,
            interval,
            state,
        })
    }

    /// Current state
    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Configured tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Execute a single fetch + parse + record cycle
    ///
    /// Exactly one duration sample is recorded, and exactly one of
    /// `record_success` / `record_error` is called.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let start = Instant::now();

        let result = match self.fetcher.fetch().await {
            Ok(body) => parse_value(&body),
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(value) => {
                self.metrics.record_success(value);
                tracing::info!(value, "Successfully fetched utilization");
                CycleOutcome::Success { value }
            }
            Err(cause) => {
                self.metrics.record_error();
                let stage = cause.stage();
                tracing::error!(
                    stage = %stage,
                    error = %cause,
                    "Failed to fetch utilization"
                );
                CycleOutcome::Failure { stage, cause }
            }
        };

        let elapsed = start.elapsed();
        if let Err(e) = self.metrics.observe_duration(elapsed.as_secs_f64()) {
            tracing::warn!(error = %e, "Failed to record cycle duration");
        }
        tracing::debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            success = outcome.is_success(),
            "Poll cycle finished"
        );

        outcome
    }

    /// Run until `cancel` fires
    ///
    /// The cancellation check happens while waiting for the next tick only.
    pub async fn run(self, cancel: CancellationToken) {
        self.state.send_replace(PollState::Running);
        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            "Starting metrics collection"
        );

        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        tracing::info!("Stopping metrics collection");
        self.state.send_replace(PollState::Stopped);
    }

    /// Start the loop on a background task
    pub fn spawn(self, cancel: CancellationToken) -> PollHandle {
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run(cancel));
        PollHandle { state, task }
    }
}

/// Handle to a spawned [`PollLoop`]
#[derive(Debug)]
pub struct PollHandle {
    state: watch::Receiver<PollState>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Latest observed state
    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Wait for the loop task to exit
    ///
    /// A panic inside the loop is logged and reported as stopped.
    pub async fn stopped(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Poll loop task terminated abnormally");
        }
    }
}
