//! Deliveries and subscriptions.
//!
//! A [`Delivery`] owns one unacknowledged message. It must be consumed by
//! [`Delivery::ack`] once processing reached a terminal state; dropping it
//! (or calling [`Delivery::release`]) hands the message back to the queue
//! for redelivery. Each delivery also holds one prefetch permit of its
//! subscription, so at most `prefetch` deliveries are outstanding at once.

use bytes::Bytes;
use sbomer_core::pipeline::BoxFuture;
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tokio::task::JoinHandle;

use crate::error::QueueError;

/// Backend-specific settlement of one delivery.
///
/// Dropping an acker without calling either method must make the message
/// visible again.
pub(crate) trait Acker: Send {
    fn ack(self: Box<Self>) -> BoxFuture<'static, Result<(), QueueError>>;
    fn release(self: Box<Self>) -> BoxFuture<'static, Result<(), QueueError>>;
}

/// One message handed to a consumer.
pub struct Delivery {
    body: Bytes,
    tag: u64,
    acker: Box<dyn Acker>,
    _permit: OwnedSemaphorePermit,
}

impl Delivery {
    pub(crate) fn new(
        body: Bytes,
        tag: u64,
        acker: Box<dyn Acker>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            body,
            tag,
            acker,
            _permit: permit,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Backend identifier of the message, stable across redeliveries.
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Removes the message from the queue.
    pub async fn ack(self) -> Result<(), QueueError> {
        self.acker.ack().await
    }

    /// Returns the message to the queue for redelivery.
    pub async fn release(self) -> Result<(), QueueError> {
        self.acker.release().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("len", &self.body.len())
            .finish()
    }
}

/// Unbounded, non-restartable stream of deliveries for one consumer group.
///
/// A background pump claims messages while prefetch permits are free.
/// Dropping the subscription stops the pump and releases every delivery
/// that was claimed but not yet handed out.
pub struct Subscription {
    consumer_group: String,
    rx: mpsc::Receiver<Delivery>,
    pump: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(
        consumer_group: String,
        rx: mpsc::Receiver<Delivery>,
        pump: JoinHandle<()>,
    ) -> Self {
        Self {
            consumer_group,
            rx,
            pump,
        }
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    /// Waits for the next delivery. `None` once the backend is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("consumer_group", &self.consumer_group)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
