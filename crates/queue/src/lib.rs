//! Durable, at-least-once work queue with exchange routing and consumer
//! groups.
//!
//! Producers publish to an exchange with a routing key; the exchange copies
//! the message to every consumer group whose binding matches. Each consumer
//! group is one logical queue: competing subscribers share it, and a
//! message is removed only when a subscriber acknowledges it.
//!
//! Two backends share these semantics:
//!
//! - [`PgBroker`] stores messages in PostgreSQL and claims them with
//!   `FOR UPDATE SKIP LOCKED`, so an unacknowledged message survives a
//!   crash and is redelivered.
//! - [`MemoryBroker`] keeps everything in process, for tests and local runs.

pub mod delivery;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod routing;

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

pub use delivery::{Delivery, Subscription};
pub use error::QueueError;
pub use memory::MemoryBroker;
pub use postgres::PgBroker;
pub use routing::{Binding, ExchangeKind};

/// Publishing side of the queue.
pub trait Publisher: Send + Sync {
    /// Stores the message for every matching consumer group before
    /// returning. An error means nothing was stored and the call may be
    /// retried.
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;
}

/// Consuming side of the queue.
pub trait Consumer: Send + Sync {
    /// Opens a subscription holding at most `prefetch` unacknowledged
    /// deliveries.
    fn subscribe(
        &self,
        consumer_group: &str,
        prefetch: usize,
    ) -> impl Future<Output = Result<Subscription, QueueError>> + Send;
}

impl<T: Publisher> Publisher for Arc<T> {
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
    ) -> impl Future<Output = Result<(), QueueError>> + Send {
        (**self).publish(exchange, routing_key, body)
    }
}

impl<T: Consumer> Consumer for Arc<T> {
    fn subscribe(
        &self,
        consumer_group: &str,
        prefetch: usize,
    ) -> impl Future<Output = Result<Subscription, QueueError>> + Send {
        (**self).subscribe(consumer_group, prefetch)
    }
}
