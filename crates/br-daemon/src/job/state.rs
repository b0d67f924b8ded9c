//! Job state guarded by the orchestrator lock

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use br_core::{JobPhase, JobSnapshot, LastRun, Timestamp};

/// Mutable job state. One instance per process.
#[derive(Debug)]
pub(crate) struct JobState {
    phase: JobPhase,
    started_at: Option<Timestamp>,
    /// Monotonic start, for elapsed time
    started: Option<Instant>,
    /// Cancels the in-flight run
    cancel: Option<CancellationToken>,
    last_run: LastRun,
}

impl JobState {
    pub(crate) fn new() -> Self {
        Self {
            phase: JobPhase::Idle,
            started_at: None,
            started: None,
            cancel: None,
            last_run: LastRun::default(),
        }
    }

    pub(crate) fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Move Idle to Running.
    ///
    /// Returns the new run's cancellation token, or `None` if a run is
    /// already in progress.
    pub(crate) fn begin(&mut self) -> Option<CancellationToken> {
        if self.phase == JobPhase::Running {
            return None;
        }

        let cancel = CancellationToken::new();
        self.phase = JobPhase::Running;
        self.started_at = Some(Timestamp::now());
        self.started = Some(Instant::now());
        self.cancel = Some(cancel.clone());
        Some(cancel)
    }

    /// Record the finished run and return to Idle.
    ///
    /// `error` is empty on success. Returns how long the run took.
    pub(crate) fn settle(&mut self, error: String) -> Duration {
        let elapsed = self.elapsed().unwrap_or_default();

        self.last_run = LastRun {
            error,
            started_at: self.started_at,
        };
        self.phase = JobPhase::Idle;
        self.started_at = None;
        self.started = None;
        self.cancel = None;

        elapsed
    }

    /// Cancel the in-flight run, if any
    pub(crate) fn cancel(&self) -> bool {
        match &self.cancel {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Time since the current run started; `None` while idle
    pub(crate) fn elapsed(&self) -> Option<Duration> {
        self.started.map(|started| started.elapsed())
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            working: self.phase == JobPhase::Running,
            started_at: self.started_at,
            last_run: self.last_run.clone(),
        }
    }
}
