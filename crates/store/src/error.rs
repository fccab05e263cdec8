//! Result store errors.
//!
//! [`StoreError`] converts into the core [`StorageError`] returned by the
//! `ResultStore` trait, and from there into [`SbomerError`].

use sbomer_core::error::{SbomerError, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Pool creation or connection acquisition failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A statement failed.
    #[error("{operation} failed: {reason}")]
    Query {
        operation: &'static str,
        reason: String,
    },

    /// Applying the embedded migrations failed.
    #[error("migration failed: {0}")]
    Migration(String),
}

impl StoreError {
    pub(crate) fn query(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |e| match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(e.to_string())
            }
            other => StoreError::Query {
                operation,
                reason: other.to_string(),
            },
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(err.to_string())
    }
}

impl From<StoreError> for StorageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(msg) => StorageError::Connection(msg),
            StoreError::Query { .. } => StorageError::Query(err.to_string()),
            StoreError::Migration(msg) => StorageError::Migration(msg),
        }
    }
}

impl From<StoreError> for SbomerError {
    fn from(err: StoreError) -> Self {
        SbomerError::Storage(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_names_operation() {
        let err = StoreError::query("upsert sbom")(sqlx::Error::RowNotFound);
        let msg = err.to_string();
        assert!(msg.contains("upsert sbom"));
    }

    #[test]
    fn pool_timeout_is_connection_error() {
        let err = StoreError::query("append log")(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[test]
    fn converts_to_storage_error() {
        let err: StorageError = StoreError::Migration("checksum mismatch".to_owned()).into();
        assert!(matches!(err, StorageError::Migration(ref m) if m.contains("checksum")));

        let err: SbomerError = StoreError::Connection("refused".to_owned()).into();
        assert!(matches!(err, SbomerError::Storage(StorageError::Connection(_))));
    }
}
