//! Daemon assembly and lifecycle.
//!
//! The [`Orchestrator`] validates configuration, connects to PostgreSQL, runs
//! migrations, declares the queue topology, builds the enabled stages and
//! then runs until a shutdown signal arrives.
//!
//! # Start order
//!
//! 1. Job processor (consumes the discovery group)
//! 2. Discovery scheduler (publishes to the discovery exchange)
//!
//! # Stop order
//!
//! Reverse: the scheduler stops publishing first, then the processor
//! settles its in-flight items.
//!
//! # Exit conditions
//!
//! - `SIGTERM` or `SIGINT`
//! - `schedule = "once"` with the processor disabled: after the pass

use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{broadcast, watch};

use sbomer_core::config::SbomerConfig;
use sbomer_gitlab::{GitCheckout, GitLabClient};
use sbomer_processor::SyftGenerator;
use sbomer_queue::{Binding, PgBroker};
use sbomer_store::PgResultStore;

use crate::health::{DaemonHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};

const UPTIME_INTERVAL: Duration = Duration::from_secs(10);

/// Why the main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Signal(&'static str),
    DiscoveryComplete,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "{name}"),
            Self::DiscoveryComplete => f.write_str("discovery pass complete"),
        }
    }
}

/// The daemon's central coordinator.
pub struct Orchestrator {
    config: SbomerConfig,
    modules: ModuleRegistry,
    /// Set when the daemon should exit once discovery is done.
    discovery_done: Option<watch::Receiver<u64>>,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl Orchestrator {
    /// Builds the daemon from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// - validation fails or both stages are disabled
    /// - the database is unreachable or a migration fails
    /// - the queue topology cannot be declared
    pub async fn build_from_config(config: SbomerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        check_stages(&config)?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        tracing::info!(
            host = %config.database.host,
            dbname = %config.database.dbname,
            "connecting to PostgreSQL"
        );
        let pool = sbomer_store::connect(&config.database_url(), config.database.max_connections)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to database: {}", e))?;
        sbomer_store::migrate(&pool)
            .await
            .map_err(|e| anyhow::anyhow!("failed to run migrations: {}", e))?;

        let broker = PgBroker::new(
            pool.clone(),
            Duration::from_millis(config.queue.poll_interval_ms),
        );
        broker.ensure_schema().await?;
        for binding in [&config.queue.discovery, &config.queue.downstream] {
            let binding = Binding::try_from(binding)?;
            broker.declare(&binding).await?;
        }
        let store = PgResultStore::new(pool);

        let gitlab = GitLabClient::new(&config.gitlab)
            .map_err(|e| anyhow::anyhow!("failed to build GitLab client: {}", e))?;

        let mut registry = ModuleRegistry::new();

        let generator = SyftGenerator::from_config(&config.syft);
        if config.processor.enabled {
            if let Err(e) = generator.resolve_binary() {
                tracing::warn!(error = %e, "syft binary not found; items will fail until it is installed");
            }
        }
        let checkout = GitCheckout::new(gitlab.clone(), &config.gitlab);
        if let Some(handle) = modules::processor::init(
            &config,
            checkout,
            generator,
            store.clone(),
            broker.clone(),
            broker.clone(),
        )? {
            registry.register(handle);
        }

        let mut discovery_done = None;
        if let Some(fetcher) = modules::fetcher::init(&config, gitlab, broker, store)? {
            if fetcher.once && !config.processor.enabled {
                discovery_done = Some(fetcher.passes);
            }
            registry.register(fetcher.handle);
        }

        Ok(Self::from_parts(config, registry, discovery_done))
    }

    /// Assembles an orchestrator from prebuilt stages.
    ///
    /// With `discovery_done` set, [`run`](Self::run) returns as soon as
    /// the counter turns non-zero.
    pub fn from_parts(
        config: SbomerConfig,
        modules: ModuleRegistry,
        discovery_done: Option<watch::Receiver<u64>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        tracing::info!(modules = ?modules.names(), "orchestrator initialized");
        Self {
            config,
            modules,
            discovery_done,
            shutdown_tx,
            start_time: Instant::now(),
        }
    }

    /// Starts every stage and blocks until an exit condition.
    pub async fn run(&mut self) -> Result<ExitReason> {
        self.modules.start_all().await?;

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!("sbomer daemon running");
        let reason = match self.discovery_done.take() {
            Some(done) => tokio::select! {
                signal = wait_for_shutdown_signal() => ExitReason::Signal(signal?),
                () = wait_for_first_pass(done) => ExitReason::DiscoveryComplete,
            },
            None => ExitReason::Signal(wait_for_shutdown_signal().await?),
        };
        tracing::info!(reason = %reason, "shutting down");

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        self.modules.stop_all().await?;
        tracing::info!(uptime_secs = self.start_time.elapsed().as_secs(), "sbomer daemon stopped");
        Ok(reason)
    }

    /// Current aggregated health.
    pub async fn health(&self) -> DaemonHealth {
        let modules = self.modules.health_statuses().await;
        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    pub fn config(&self) -> &SbomerConfig {
        &self.config
    }
}

/// Rejects configurations with nothing to run, and pools too small for
/// the processor's prefetch. Every unacknowledged delivery holds a
/// connection.
pub fn check_stages(config: &SbomerConfig) -> Result<()> {
    if !config.fetcher.enabled && !config.processor.enabled {
        return Err(anyhow::anyhow!(
            "both [fetcher] and [processor] are disabled; nothing to run"
        ));
    }

    if config.processor.enabled {
        let prefetch = config.queue.discovery.prefetch;
        let max_connections = config.database.max_connections as usize;
        if max_connections <= prefetch {
            return Err(anyhow::anyhow!(
                "database.max_connections ({}) must exceed queue.discovery.prefetch ({})",
                max_connections,
                prefetch
            ));
        }
    }
    Ok(())
}

async fn wait_for_first_pass(mut passes: watch::Receiver<u64>) {
    if passes.wait_for(|completed| *completed > 0).await.is_err() {
        // Sender gone: the scheduler was dropped, nothing left to wait for.
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl-C handler: {}", e))?;
    Ok("ctrl-c")
}

/// Refreshes the uptime gauge until shutdown.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use sbomer_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs_f64());
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_enabled_is_rejected() {
        let mut config = SbomerConfig::default();
        config.fetcher.enabled = false;
        config.processor.enabled = false;
        let err = check_stages(&config).unwrap_err();
        assert!(err.to_string().contains("nothing to run"));
    }

    #[test]
    fn pool_must_exceed_prefetch() {
        let mut config = SbomerConfig::default();
        config.database.max_connections = 4;
        config.queue.discovery.prefetch = 4;
        assert!(check_stages(&config).is_err());

        config.queue.discovery.prefetch = 3;
        assert!(check_stages(&config).is_ok());

        // The scheduler alone holds no deliveries.
        config.processor.enabled = false;
        config.queue.discovery.prefetch = 64;
        assert!(check_stages(&config).is_ok());
    }

    #[tokio::test]
    async fn uptime_updater_stops_on_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let task = spawn_uptime_updater(Instant::now(), rx);
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("updater should exit")
            .unwrap();
    }

    #[test]
    fn exit_reason_display() {
        assert_eq!(ExitReason::Signal("SIGTERM").to_string(), "SIGTERM");
        assert_eq!(
            ExitReason::DiscoveryComplete.to_string(),
            "discovery pass complete"
        );
    }
}
