//! In-process broker.
//!
//! Same routing, prefetch and redelivery behavior as [`PgBroker`], without
//! durability across restarts.
//!
//! [`PgBroker`]: crate::postgres::PgBroker

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use sbomer_core::pipeline::BoxFuture;
use tokio::sync::{Notify, Semaphore, mpsc};
use tracing::debug;

use crate::delivery::{Acker, Delivery, Subscription};
use crate::error::QueueError;
use crate::routing::{Binding, ExchangeKind};
use crate::{Consumer, Publisher};

struct Message {
    tag: u64,
    body: Bytes,
}

#[derive(Default)]
struct GroupQueue {
    ready: VecDeque<Message>,
    unacked: usize,
    notify: Arc<Notify>,
}

struct Exchange {
    kind: ExchangeKind,
    /// (binding key, consumer group)
    bindings: Vec<(String, String)>,
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, Exchange>,
    groups: HashMap<String, GroupQueue>,
    next_tag: u64,
}

/// In-memory broker. Clones share the same queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declares the exchange, the consumer group and the binding between
    /// them. Redeclaring is a no-op; redeclaring with another kind fails.
    pub fn declare(&self, binding: &Binding) -> Result<(), QueueError> {
        let mut state = self.lock();
        let exchange = state
            .exchanges
            .entry(binding.exchange.clone())
            .or_insert_with(|| Exchange {
                kind: binding.kind,
                bindings: Vec::new(),
            });

        if exchange.kind != binding.kind {
            return Err(QueueError::Declare {
                exchange: binding.exchange.clone(),
                reason: format!(
                    "already declared as {}, not {}",
                    exchange.kind, binding.kind
                ),
            });
        }

        let pair = (binding.routing_key.clone(), binding.consumer_group.clone());
        if !exchange.bindings.contains(&pair) {
            exchange.bindings.push(pair);
        }

        state
            .groups
            .entry(binding.consumer_group.clone())
            .or_default();
        Ok(())
    }

    /// Messages waiting for a subscriber.
    pub fn ready_count(&self, consumer_group: &str) -> usize {
        self.lock()
            .groups
            .get(consumer_group)
            .map_or(0, |q| q.ready.len())
    }

    /// Messages handed out and not yet settled.
    pub fn unacked_count(&self, consumer_group: &str) -> usize {
        self.lock()
            .groups
            .get(consumer_group)
            .map_or(0, |q| q.unacked)
    }

    fn enqueue(&self, exchange: &str, routing_key: &str, body: Bytes) -> Result<(), QueueError> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let ex = state
            .exchanges
            .get(exchange)
            .ok_or_else(|| QueueError::UnknownExchange(exchange.to_owned()))?;

        let mut targets: Vec<String> = ex
            .bindings
            .iter()
            .filter(|(key, _)| ex.kind.routes(key, routing_key))
            .map(|(_, group)| group.clone())
            .collect();
        targets.sort();
        targets.dedup();

        if targets.is_empty() {
            debug!(exchange, routing_key, "no binding matched, message dropped");
        }

        for group in targets {
            state.next_tag += 1;
            let tag = state.next_tag;
            if let Some(queue) = state.groups.get_mut(&group) {
                queue.ready.push_back(Message {
                    tag,
                    body: body.clone(),
                });
                queue.notify.notify_one();
            }
        }
        Ok(())
    }

    fn take(&self, consumer_group: &str) -> Option<Message> {
        let mut state = self.lock();
        let queue = state.groups.get_mut(consumer_group)?;
        let message = queue.ready.pop_front()?;
        queue.unacked += 1;
        Some(message)
    }

    async fn next_ready(&self, consumer_group: &str, notify: &Notify) -> Message {
        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.take(consumer_group) {
                return message;
            }
            notified.await;
        }
    }

    fn settle(&self, consumer_group: &str, message: Message, requeue: bool) {
        let mut state = self.lock();
        let Some(queue) = state.groups.get_mut(consumer_group) else {
            return;
        };
        queue.unacked = queue.unacked.saturating_sub(1);
        if requeue {
            debug!(consumer_group, tag = message.tag, "delivery released");
            queue.ready.push_front(message);
            queue.notify.notify_one();
        }
    }
}

impl Publisher for MemoryBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
    ) -> Result<(), QueueError> {
        self.enqueue(exchange, routing_key, body)
    }
}

impl Consumer for MemoryBroker {
    async fn subscribe(
        &self,
        consumer_group: &str,
        prefetch: usize,
    ) -> Result<Subscription, QueueError> {
        let notify = self
            .lock()
            .groups
            .get(consumer_group)
            .map(|q| Arc::clone(&q.notify))
            .ok_or_else(|| QueueError::UnknownConsumerGroup(consumer_group.to_owned()))?;

        let prefetch = prefetch.max(1);
        let permits = Arc::new(Semaphore::new(prefetch));
        let (tx, rx) = mpsc::channel(prefetch);
        let broker = self.clone();
        let group = consumer_group.to_owned();

        let pump = tokio::spawn(async move {
            loop {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let message = broker.next_ready(&group, &notify).await;
                let tag = message.tag;
                let body = message.body.clone();
                let acker = MemoryAcker {
                    broker: broker.clone(),
                    consumer_group: group.clone(),
                    message: Some(message),
                };
                let delivery = Delivery::new(body, tag, Box::new(acker), permit);
                if tx.send(delivery).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(consumer_group.to_owned(), rx, pump))
    }
}

struct MemoryAcker {
    broker: MemoryBroker,
    consumer_group: String,
    message: Option<Message>,
}

impl MemoryAcker {
    fn settle(&mut self, requeue: bool) {
        if let Some(message) = self.message.take() {
            self.broker.settle(&self.consumer_group, message, requeue);
        }
    }
}

impl Acker for MemoryAcker {
    fn ack(mut self: Box<Self>) -> BoxFuture<'static, Result<(), QueueError>> {
        self.settle(false);
        Box::pin(async { Ok(()) })
    }

    fn release(mut self: Box<Self>) -> BoxFuture<'static, Result<(), QueueError>> {
        self.settle(true);
        Box::pin(async { Ok(()) })
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        self.settle(true);
    }
}
