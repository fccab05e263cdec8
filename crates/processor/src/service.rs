//! [`ProcessorService`]: worker lanes consuming the discovery queue.
//!
//! One subscription with `prefetch` permits is shared by `prefetch` lanes.
//! Each lane pulls a delivery, runs it through the [`JobProcessor`] to a
//! terminal state, settles it, and only then pulls the next one.
//!
//! On shutdown lanes stop pulling; an item already in flight finishes its
//! current phase and is settled before the lane exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use sbomer_core::error::{PipelineError, SbomerError};
use sbomer_core::metrics as m;
use sbomer_core::pipeline::{
    CheckoutProvider, HealthStatus, Pipeline, ResultStore, SbomGenerator,
};
use sbomer_queue::{Consumer, Delivery, Publisher, Subscription};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Disposition;
use crate::processor::JobProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Initialized,
    Running,
    Stopped,
}

/// Item counters, shared with the lanes.
#[derive(Default)]
struct LaneStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
    requeued: AtomicU64,
    active_lanes: AtomicUsize,
}

/// Everything a lane needs.
struct Lane<C, G, R, P> {
    id: usize,
    processor: Arc<JobProcessor<C, G, R, P>>,
    subscription: Arc<Mutex<Subscription>>,
    cancel: CancellationToken,
    requeue_delay: Duration,
    stats: Arc<LaneStats>,
}

impl<C, G, R, P> Lane<C, G, R, P>
where
    C: CheckoutProvider,
    G: SbomGenerator,
    R: ResultStore,
    P: Publisher,
{
    async fn run(self) {
        self.stats.active_lanes.fetch_add(1, Ordering::Relaxed);
        debug!(lane = self.id, "worker lane started");

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                delivery = async { self.subscription.lock().await.next().await } => delivery,
            };

            let Some(delivery) = next else {
                warn!(lane = self.id, "subscription closed, worker lane exiting");
                break;
            };
            self.handle(delivery).await;
        }

        self.stats.active_lanes.fetch_sub(1, Ordering::Relaxed);
        debug!(lane = self.id, "worker lane stopped");
    }

    async fn handle(&self, delivery: Delivery) {
        let started = Instant::now();
        let tag = delivery.tag();
        let result = self.processor.process(delivery.body(), &self.cancel).await;

        let (label, disposition) = match &result {
            Ok(_) => ("success", Disposition::Ack),
            Err(e) => (e.result_label(), e.disposition()),
        };

        match disposition {
            Disposition::Ack => {
                if let Err(e) = delivery.ack().await {
                    warn!(lane = self.id, tag, error = %e, "failed to acknowledge delivery");
                }
            }
            Disposition::Requeue => {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {}
                    () = tokio::time::sleep(self.requeue_delay) => {}
                }
                if let Err(e) = delivery.release().await {
                    warn!(lane = self.id, tag, error = %e, "failed to release delivery");
                }
            }
        }

        let counter_slot = match (&result, disposition) {
            (Ok(_), _) => &self.stats.succeeded,
            (Err(_), Disposition::Requeue) => &self.stats.requeued,
            (Err(_), Disposition::Ack) => &self.stats.failed,
        };
        counter_slot.fetch_add(1, Ordering::Relaxed);

        counter!(m::PROCESSOR_ITEMS_TOTAL, m::LABEL_RESULT => label).increment(1);
        histogram!(m::PROCESSOR_ITEM_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(lane = self.id, tag, result = label, "delivery settled");
    }
}

/// Job processor stage.
///
/// `stop()` waits for in-flight items; it does not abort them.
pub struct ProcessorService<C, G, R, P, Q> {
    processor: Arc<JobProcessor<C, G, R, P>>,
    consumer: Q,
    consumer_group: String,
    prefetch: usize,
    requeue_delay: Duration,
    state: ServiceState,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<LaneStats>,
}

impl<C, G, R, P, Q> ProcessorService<C, G, R, P, Q>
where
    C: CheckoutProvider + 'static,
    G: SbomGenerator + 'static,
    R: ResultStore + 'static,
    P: Publisher + 'static,
    Q: Consumer,
{
    pub fn new(
        processor: JobProcessor<C, G, R, P>,
        consumer: Q,
        consumer_group: impl Into<String>,
        prefetch: usize,
    ) -> Self {
        Self {
            processor: Arc::new(processor),
            consumer,
            consumer_group: consumer_group.into(),
            prefetch: prefetch.max(1),
            requeue_delay: Duration::from_secs(5),
            state: ServiceState::Initialized,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            stats: Arc::new(LaneStats::default()),
        }
    }

    /// How long a requeued delivery is held before it is released.
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    pub fn succeeded(&self) -> u64 {
        self.stats.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    pub fn requeued(&self) -> u64 {
        self.stats.requeued.load(Ordering::Relaxed)
    }

    /// Items settled so far, whatever the outcome.
    pub fn settled(&self) -> u64 {
        self.succeeded() + self.failed() + self.requeued()
    }

    pub fn state_name(&self) -> &str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }
}

impl<C, G, R, P, Q> Pipeline for ProcessorService<C, G, R, P, Q>
where
    C: CheckoutProvider + 'static,
    G: SbomGenerator + 'static,
    R: ResultStore + 'static,
    P: Publisher + 'static,
    Q: Consumer,
{
    async fn start(&mut self) -> Result<(), SbomerError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let subscription = self
            .consumer
            .subscribe(&self.consumer_group, self.prefetch)
            .await?;
        let subscription = Arc::new(Mutex::new(subscription));

        self.cancel = CancellationToken::new();
        for id in 0..self.prefetch {
            let lane = Lane {
                id,
                processor: Arc::clone(&self.processor),
                subscription: Arc::clone(&subscription),
                cancel: self.cancel.clone(),
                requeue_delay: self.requeue_delay,
                stats: Arc::clone(&self.stats),
            };
            self.tasks.push(tokio::spawn(lane.run()));
        }

        self.state = ServiceState::Running;
        info!(
            consumer_group = %self.consumer_group,
            lanes = self.prefetch,
            "job processor started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SbomerError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!(in_flight_lanes = self.tasks.len(), "stopping job processor");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "worker lane did not exit cleanly");
            }
        }

        self.state = ServiceState::Stopped;
        info!(
            succeeded = self.succeeded(),
            failed = self.failed(),
            requeued = self.requeued(),
            "job processor stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running => {
                let active = self.stats.active_lanes.load(Ordering::Relaxed);
                if active == 0 && self.tasks.iter().all(JoinHandle::is_finished) {
                    HealthStatus::Unhealthy("all worker lanes exited".to_owned())
                } else if self.tasks.iter().any(JoinHandle::is_finished) {
                    HealthStatus::Degraded(format!(
                        "{active} of {} worker lanes running",
                        self.prefetch
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}
