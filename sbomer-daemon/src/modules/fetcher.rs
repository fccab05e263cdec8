//! Discovery scheduler wiring.
//!
//! ```text
//! ProjectSource --pages--> Fetcher --WorkItem--> discovery exchange
//!                             \--BatchStats--> result store
//! ```

use anyhow::Result;
use tokio::sync::watch;

use sbomer_core::config::SbomerConfig;
use sbomer_core::pipeline::{ProjectSource, ResultStore};
use sbomer_fetcher::{Fetcher, FetcherService, FetcherSettings, Schedule};
use sbomer_queue::Publisher;

use super::ModuleHandle;

pub const NAME: &str = "fetcher";

/// An initialised scheduler and its completed-pass counter.
pub struct FetcherModule {
    pub handle: ModuleHandle,
    /// Turns 1 when a `once` pass is done.
    pub passes: watch::Receiver<u64>,
    pub once: bool,
}

/// Builds the scheduler. `Ok(None)` when `[fetcher] enabled = false`.
pub fn init<S, P, R>(
    config: &SbomerConfig,
    source: S,
    publisher: P,
    store: R,
) -> Result<Option<FetcherModule>>
where
    S: ProjectSource + 'static,
    P: Publisher + 'static,
    R: ResultStore + 'static,
{
    if !config.fetcher.enabled {
        tracing::info!("discovery scheduler disabled in configuration");
        return Ok(None);
    }

    let schedule: Schedule = config
        .fetcher
        .schedule
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid discovery schedule: {}", e))?;
    let settings = FetcherSettings::from_config(&config.fetcher, &config.queue.discovery);

    tracing::info!(
        schedule = %schedule,
        scopes = settings.scopes().len(),
        batch_size = settings.batch_size,
        exchange = %settings.exchange,
        "initializing discovery scheduler"
    );

    let service = FetcherService::new(Fetcher::new(source, publisher, store, settings), schedule);
    let passes = service.passes();
    let once = service.schedule().is_once();

    Ok(Some(FetcherModule {
        handle: ModuleHandle::new(NAME, Box::new(service)),
        passes,
        once,
    }))
}
