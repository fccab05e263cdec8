//! PostgreSQL-backed broker.
//!
//! Bindings live in `queue_bindings`, messages in `queue_messages` (one row
//! per consumer group a message was routed to). A subscriber claims a row
//! with `FOR UPDATE SKIP LOCKED` inside a transaction that travels with the
//! [`Delivery`]: acknowledging deletes the row and commits, anything else
//! rolls back and leaves the row for the next claim. Every outstanding
//! delivery therefore pins one pool connection, so the pool must be larger
//! than the sum of all prefetch limits.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sbomer_core::pipeline::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, trace, warn};

use crate::delivery::{Acker, Delivery, Subscription};
use crate::error::QueueError;
use crate::routing::{Binding, ExchangeKind};
use crate::{Consumer, Publisher};

const SCHEMA: [&str; 3] = [
    r"
    CREATE TABLE IF NOT EXISTS queue_bindings (
        exchange       TEXT NOT NULL,
        exchange_kind  TEXT NOT NULL,
        routing_key    TEXT NOT NULL,
        consumer_group TEXT NOT NULL,
        PRIMARY KEY (exchange, routing_key, consumer_group)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS queue_messages (
        id             BIGSERIAL PRIMARY KEY,
        consumer_group TEXT NOT NULL,
        routing_key    TEXT NOT NULL,
        body           BYTEA NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    "CREATE INDEX IF NOT EXISTS queue_messages_group_idx ON queue_messages (consumer_group, id)",
];

/// Durable broker on a shared PostgreSQL pool.
#[derive(Clone)]
pub struct PgBroker {
    pool: PgPool,
    poll_interval: Duration,
}

impl PgBroker {
    /// `poll_interval` is how long an idle subscription waits before
    /// looking for new rows again.
    pub fn new(pool: PgPool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    /// Creates the queue tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), QueueError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::Connection(e.to_string()))?;
        }
        Ok(())
    }

    /// Declares a binding. Safe to repeat; fails if the exchange already
    /// exists with another kind.
    pub async fn declare(&self, binding: &Binding) -> Result<(), QueueError> {
        let declare_err = |reason: String| QueueError::Declare {
            exchange: binding.exchange.clone(),
            reason,
        };

        self.ensure_schema().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT exchange_kind FROM queue_bindings WHERE exchange = $1 LIMIT 1",
        )
        .bind(&binding.exchange)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| declare_err(e.to_string()))?;

        if let Some(kind) = existing.filter(|k| k != binding.kind.as_str()) {
            return Err(declare_err(format!(
                "already declared as {kind}, not {}",
                binding.kind
            )));
        }

        sqlx::query(
            r"
            INSERT INTO queue_bindings (exchange, exchange_kind, routing_key, consumer_group)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(&binding.exchange)
        .bind(binding.kind.as_str())
        .bind(&binding.routing_key)
        .bind(&binding.consumer_group)
        .execute(&self.pool)
        .await
        .map_err(|e| declare_err(e.to_string()))?;

        debug!(
            exchange = %binding.exchange,
            kind = %binding.kind,
            consumer_group = %binding.consumer_group,
            "binding declared"
        );
        Ok(())
    }

    /// Messages waiting in a consumer group, including claimed ones.
    pub async fn depth(&self, consumer_group: &str) -> Result<i64, QueueError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages WHERE consumer_group = $1")
                .bind(consumer_group)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn route(&self, exchange: &str, routing_key: &str) -> Result<Vec<String>, QueueError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT exchange_kind, routing_key, consumer_group FROM queue_bindings WHERE exchange = $1",
        )
        .bind(exchange)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Publish {
            exchange: exchange.to_owned(),
            reason: e.to_string(),
        })?;

        if rows.is_empty() {
            return Err(QueueError::UnknownExchange(exchange.to_owned()));
        }

        let mut groups = BTreeSet::new();
        for (kind, binding_key, group) in rows {
            let kind: ExchangeKind = kind.parse()?;
            if kind.routes(&binding_key, routing_key) {
                groups.insert(group);
            }
        }
        Ok(groups.into_iter().collect())
    }
}

impl Publisher for PgBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
    ) -> Result<(), QueueError> {
        let groups = self.route(exchange, routing_key).await?;
        if groups.is_empty() {
            debug!(exchange, routing_key, "no binding matched, message dropped");
            return Ok(());
        }

        // one statement, so either every group gets the message or none does
        sqlx::query(
            r"
            INSERT INTO queue_messages (consumer_group, routing_key, body)
            SELECT g, $2, $3 FROM UNNEST($1::TEXT[]) AS g
            ",
        )
        .bind(&groups)
        .bind(routing_key)
        .bind(body.as_ref())
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Publish {
            exchange: exchange.to_owned(),
            reason: e.to_string(),
        })?;

        trace!(exchange, routing_key, groups = groups.len(), "message stored");
        Ok(())
    }
}

impl Consumer for PgBroker {
    async fn subscribe(
        &self,
        consumer_group: &str,
        prefetch: usize,
    ) -> Result<Subscription, QueueError> {
        let known: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM queue_bindings WHERE consumer_group = $1)",
        )
        .bind(consumer_group)
        .fetch_one(&self.pool)
        .await?;
        if !known {
            return Err(QueueError::UnknownConsumerGroup(consumer_group.to_owned()));
        }

        let prefetch = prefetch.max(1);
        let permits = Arc::new(Semaphore::new(prefetch));
        let (tx, rx) = mpsc::channel(prefetch);
        let pool = self.pool.clone();
        let poll_interval = self.poll_interval;
        let group = consumer_group.to_owned();

        let pump = tokio::spawn(async move {
            loop {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };

                let (id, body, acker) = loop {
                    match claim(&pool, &group).await {
                        Ok(Some(claimed)) => break claimed,
                        Ok(None) => tokio::time::sleep(poll_interval).await,
                        Err(e) => {
                            warn!(consumer_group = %group, error = %e, "failed to claim message");
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                };

                let tag = u64::try_from(id).unwrap_or_default();
                let delivery = Delivery::new(body, tag, Box::new(acker), permit);
                if tx.send(delivery).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(consumer_group.to_owned(), rx, pump))
    }
}

async fn claim(
    pool: &PgPool,
    consumer_group: &str,
) -> Result<Option<(i64, Bytes, PgAcker)>, QueueError> {
    let mut tx = pool.begin().await?;

    let row: Option<(i64, Vec<u8>)> = sqlx::query_as(
        r"
        SELECT id, body
        FROM queue_messages
        WHERE consumer_group = $1
        ORDER BY id ASC
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        ",
    )
    .bind(consumer_group)
    .fetch_optional(&mut *tx)
    .await?;

    match row {
        Some((id, body)) => Ok(Some((
            id,
            Bytes::from(body),
            PgAcker {
                id,
                tx: Some(tx),
            },
        ))),
        None => {
            tx.rollback().await?;
            Ok(None)
        }
    }
}

/// Holds the claiming transaction. Dropping it rolls back, which releases
/// the row lock.
struct PgAcker {
    id: i64,
    tx: Option<Transaction<'static, Postgres>>,
}

impl Acker for PgAcker {
    fn ack(mut self: Box<Self>) -> BoxFuture<'static, Result<(), QueueError>> {
        let id = self.id;
        let tx = self.tx.take();
        Box::pin(async move {
            let ack_err = move |e: sqlx::Error| QueueError::Ack {
                tag: u64::try_from(id).unwrap_or_default(),
                reason: e.to_string(),
            };
            let Some(mut tx) = tx else {
                return Ok(());
            };
            sqlx::query("DELETE FROM queue_messages WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(ack_err)?;
            tx.commit().await.map_err(ack_err)
        })
    }

    fn release(mut self: Box<Self>) -> BoxFuture<'static, Result<(), QueueError>> {
        let id = self.id;
        let tx = self.tx.take();
        Box::pin(async move {
            match tx {
                Some(tx) => tx.rollback().await.map_err(|e| QueueError::Ack {
                    tag: u64::try_from(id).unwrap_or_default(),
                    reason: e.to_string(),
                }),
                None => Ok(()),
            }
        })
    }
}
