//! Job processor wiring.
//!
//! ```text
//! discovery group --> ProcessorService lanes --> JobProcessor
//!                                                   |--> checkout + syft
//!                                                   |--> result store
//!                                                   \--> downstream exchange
//! ```

use std::time::Duration;

use anyhow::Result;

use sbomer_core::config::SbomerConfig;
use sbomer_core::pipeline::{CheckoutProvider, ResultStore, SbomGenerator};
use sbomer_processor::{DownstreamTarget, JobProcessor, ProcessorService};
use sbomer_queue::{Consumer, Publisher};

use super::ModuleHandle;

pub const NAME: &str = "processor";

/// Builds the processor. `Ok(None)` when `[processor] enabled = false`.
pub fn init<C, G, R, P, Q>(
    config: &SbomerConfig,
    checkout: C,
    generator: G,
    store: R,
    publisher: P,
    consumer: Q,
) -> Result<Option<ModuleHandle>>
where
    C: CheckoutProvider + 'static,
    G: SbomGenerator + 'static,
    R: ResultStore + 'static,
    P: Publisher + 'static,
    Q: Consumer + 'static,
{
    if !config.processor.enabled {
        tracing::info!("job processor disabled in configuration");
        return Ok(None);
    }

    let discovery = &config.queue.discovery;
    let downstream = DownstreamTarget::from(&config.queue.downstream);
    tracing::info!(
        consumer_group = %discovery.consumer_group,
        prefetch = discovery.prefetch,
        downstream_exchange = %downstream.exchange,
        "initializing job processor"
    );

    let processor = JobProcessor::new(checkout, generator, store, publisher, downstream);
    let service = ProcessorService::new(
        processor,
        consumer,
        &discovery.consumer_group,
        discovery.prefetch,
    )
    .with_requeue_delay(Duration::from_secs(config.processor.requeue_delay_secs));

    Ok(Some(ModuleHandle::new(NAME, Box::new(service))))
}
