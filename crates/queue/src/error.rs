//! Work queue errors.

use sbomer_core::error::SbomerError;

/// Queue error. Converts into [`SbomerError::Queue`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The backing store could not be reached.
    #[error("queue connection error: {0}")]
    Connection(String),

    /// Declaring an exchange or binding failed.
    #[error("declare failed for exchange '{exchange}': {reason}")]
    Declare { exchange: String, reason: String },

    /// Publishing to an exchange failed. The message was not stored.
    #[error("publish to exchange '{exchange}' failed: {reason}")]
    Publish { exchange: String, reason: String },

    /// The exchange has never been declared.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    /// No binding declares this consumer group.
    #[error("unknown consumer group: {0}")]
    UnknownConsumerGroup(String),

    /// The exchange kind is not direct, fanout or topic.
    #[error("invalid exchange kind: {0}")]
    InvalidExchangeKind(String),

    /// Claiming a message for delivery failed.
    #[error("consume failed: {0}")]
    Consume(String),

    /// Acknowledging or releasing a delivery failed.
    #[error("ack failed for delivery {tag}: {reason}")]
    Ack { tag: u64, reason: String },
}

impl From<QueueError> for SbomerError {
    fn from(err: QueueError) -> Self {
        SbomerError::Queue(err.to_string())
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                QueueError::Connection(err.to_string())
            }
            other => QueueError::Consume(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_error_display() {
        let err = QueueError::Publish {
            exchange: "sbomer".to_owned(),
            reason: "connection reset".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sbomer"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn converts_to_sbomer_error() {
        let err: SbomerError = QueueError::UnknownExchange("nope".to_owned()).into();
        assert!(matches!(err, SbomerError::Queue(ref m) if m.contains("nope")));
    }

    #[test]
    fn pool_timeout_maps_to_connection() {
        let err: QueueError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, QueueError::Connection(_)));
    }
}
