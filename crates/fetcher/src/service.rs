//! [`FetcherService`]: the discovery scheduler as a daemon stage.
//!
//! One timer task owns the schedule. In `once` mode it runs a single pass
//! and exits; otherwise it sleeps until [`next_fire`], runs a pass, and
//! computes the next fire time from the moment the pass ended. Passes are
//! therefore never concurrent, and fire times that elapse during a long
//! pass are skipped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use sbomer_core::error::{PipelineError, SbomerError};
use sbomer_core::pipeline::{HealthStatus, Pipeline, ProjectSource, ResultStore};
use sbomer_queue::Publisher;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fetcher::{Fetcher, PassReport};
use crate::schedule::{Schedule, next_fire};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Initialized,
    Running,
    Stopped,
}

/// Shared between the service handle and its timer task.
struct PassLedger {
    completed: watch::Sender<u64>,
    last_error: Mutex<Option<String>>,
}

impl PassLedger {
    fn record(&self, report: &PassReport) {
        match &report.error {
            Some(e) if e.is_cancelled() => {}
            Some(e) => {
                *self.lock_error() = Some(e.to_string());
            }
            None => {
                *self.lock_error() = None;
            }
        }
        self.completed.send_modify(|n| *n += 1);
    }

    fn lock_error(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Discovery scheduler stage.
///
/// `stop()` cancels an in-flight pass at its next suspension point (page
/// fetch or cool-off) and waits for the timer task to exit.
pub struct FetcherService<S, P, R> {
    fetcher: Arc<Fetcher<S, P, R>>,
    schedule: Schedule,
    state: ServiceState,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    ledger: Arc<PassLedger>,
}

impl<S, P, R> FetcherService<S, P, R>
where
    S: ProjectSource + 'static,
    P: Publisher + 'static,
    R: ResultStore + 'static,
{
    pub fn new(fetcher: Fetcher<S, P, R>, schedule: Schedule) -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            fetcher: Arc::new(fetcher),
            schedule,
            state: ServiceState::Initialized,
            cancel: CancellationToken::new(),
            task: None,
            ledger: Arc::new(PassLedger {
                completed,
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Watches the number of completed passes. In `once` mode the value
    /// turning 1 means discovery is done.
    pub fn passes(&self) -> watch::Receiver<u64> {
        self.ledger.completed.subscribe()
    }

    pub fn state_name(&self) -> &str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }
}

async fn run_timer<S, P, R>(
    fetcher: Arc<Fetcher<S, P, R>>,
    schedule: Schedule,
    cancel: CancellationToken,
    ledger: Arc<PassLedger>,
) where
    S: ProjectSource,
    P: Publisher,
    R: ResultStore,
{
    if schedule.is_once() {
        let report = fetcher.run_pass(&cancel).await;
        ledger.record(&report);
        return;
    }

    loop {
        let Some(fire_at) = next_fire(&schedule, Utc::now()) else {
            warn!(schedule = %schedule, "schedule has no upcoming fire time, discovery idle");
            return;
        };
        let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(next = %fire_at, "next discovery pass scheduled");

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(wait) => {}
        }

        let report = fetcher.run_pass(&cancel).await;
        ledger.record(&report);
        if cancel.is_cancelled() {
            return;
        }
    }
}

impl<S, P, R> Pipeline for FetcherService<S, P, R>
where
    S: ProjectSource + 'static,
    P: Publisher + 'static,
    R: ResultStore + 'static,
{
    async fn start(&mut self) -> Result<(), SbomerError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        self.cancel = CancellationToken::new();
        let task = tokio::spawn(run_timer(
            Arc::clone(&self.fetcher),
            self.schedule.clone(),
            self.cancel.clone(),
            Arc::clone(&self.ledger),
        ));
        self.task = Some(task);
        self.state = ServiceState::Running;

        info!(schedule = %self.schedule, "discovery scheduler started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SbomerError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping discovery scheduler");
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "discovery timer task did not exit cleanly");
            }
        }

        self.state = ServiceState::Stopped;
        info!("discovery scheduler stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running => match self.ledger.lock_error().as_deref() {
                Some(e) => HealthStatus::Degraded(format!("last discovery pass failed: {e}")),
                None => HealthStatus::Healthy,
            },
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}
