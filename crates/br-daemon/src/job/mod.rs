//! Job orchestration
//!
//! [`JobOrchestrator`] owns the single job state of the process. A trigger
//! moves it from Idle to Running and spawns a supervisor; the supervisor runs
//! the pipeline in its own task and, whatever happens, settles the state back
//! to Idle with the outcome recorded.
//!
//! # Settling
//!
//! Settling is done by [`SettleGuard`]'s `Drop`, so it happens exactly once
//! per run even if the supervisor itself unwinds. Panics in the pipeline are
//! caught inside the run task and recorded as internal failures; the panic
//! location and backtrace go to the error log.

mod panic;
mod runner;
mod state;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use br_core::config::AppConfig;
use br_core::traits::SessionFactory;
use br_core::{JobPhase, JobSnapshot, RunError};
use br_relay::RelayStats;

use state::JobState;

struct Inner {
    state: Mutex<JobState>,
    /// Signalled after every settle
    settled: Notify,
    factory: Arc<dyn SessionFactory>,
    config: Arc<AppConfig>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-flight runner for the configured pipeline
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    /// Create an idle orchestrator
    pub fn new(factory: Arc<dyn SessionFactory>, config: AppConfig) -> Self {
        panic::install_hook();
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(JobState::new()),
                settled: Notify::new(),
                factory,
                config: Arc::new(config),
            }),
        }
    }

    /// Start a run unless one is already in progress.
    ///
    /// Returns immediately. When the trigger is accepted the supervisor's
    /// handle is returned; it completes after the run has settled.
    pub fn try_start(&self) -> Option<JoinHandle<()>> {
        let cancel = self.inner.lock().begin()?;

        tracing::info!("Started performing work");
        Some(tokio::spawn(supervise(Arc::clone(&self.inner), cancel)))
    }

    /// Cancel the in-flight run. Returns whether there was one.
    pub fn abort(&self) -> bool {
        let aborted = self.inner.lock().cancel();
        if aborted {
            tracing::warn!("Abort requested, cancelling run");
        }
        aborted
    }

    /// Current state for the status surface
    pub fn snapshot(&self) -> JobSnapshot {
        self.inner.lock().snapshot()
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.inner.lock().phase() == JobPhase::Running
    }

    /// Time since the current run started; `None` while idle
    pub fn elapsed(&self) -> Option<Duration> {
        self.inner.lock().elapsed()
    }

    /// Wait until no run is in progress
    pub async fn wait_idle(&self) {
        loop {
            let settled = self.inner.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            if !self.is_running() {
                return;
            }
            settled.await;
        }
    }

    /// Pipeline configuration
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }
}

/// Settles the job state when dropped
struct SettleGuard {
    inner: Arc<Inner>,
    /// Empty on success; `None` if the supervisor never recorded an outcome
    outcome: Option<String>,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let error = self.outcome.take().unwrap_or_else(|| {
            tracing::error!("Run supervisor exited without recording an outcome");
            RunError::Internal("run supervisor exited without recording an outcome".to_string())
                .to_string()
        });

        let elapsed = self.inner.lock().settle(error);
        tracing::info!("Done. Took {:?}", elapsed);
        self.inner.settled.notify_waiters();
    }
}

async fn supervise(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut guard = SettleGuard {
        inner: Arc::clone(&inner),
        outcome: None,
    };

    let error = match execute(&inner, cancel).await {
        Ok(stats) => {
            tracing::info!(
                "Run succeeded: read {} bytes, wrote {} bytes, peak buffered {} bytes",
                stats.bytes_read,
                stats.bytes_written,
                stats.peak_buffered
            );
            String::new()
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), "Run failed: {}", e);
            e.to_string()
        }
    };
    guard.outcome = Some(error);
}

/// Run the pipeline in its own task, enforcing the optional deadline
async fn execute(inner: &Inner, cancel: CancellationToken) -> Result<RelayStats, RunError> {
    let run = runner::run_pipeline(
        Arc::clone(&inner.factory),
        Arc::clone(&inner.config),
        cancel.clone(),
    );
    // Unwind is caught on the panicking thread so its recorded trace is found
    let mut body = tokio::spawn(async move {
        AssertUnwindSafe(run)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panic::into_failure(payload)))
    });

    let mut timed_out = None;
    let joined = match inner.config.run_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut body).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!("Run exceeded {:?}, cancelling", limit);
                timed_out = Some(limit);
                cancel.cancel();
                body.await
            }
        },
        None => body.await,
    };

    match joined {
        Ok(Ok(stats)) => Ok(stats),
        Ok(Err(e)) if e.is_cancelled() => match timed_out {
            Some(limit) => Err(RunError::TimedOut(limit)),
            None => Err(RunError::Cancelled),
        },
        Ok(Err(e)) => Err(e),
        Err(e) => Err(internal_failure(e)),
    }
}

/// Convert a failed run task into an internal failure
fn internal_failure(err: JoinError) -> RunError {
    if err.is_panic() {
        return panic::into_failure(err.into_panic());
    }
    RunError::Internal("run task was cancelled".to_string())
}
