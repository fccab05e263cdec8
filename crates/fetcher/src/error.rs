//! Discovery scheduler errors.

use sbomer_core::error::{ConfigError, PipelineError, SbomerError, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// A listing page could not be fetched.
    #[error("listing {scope} page {page} failed: {source}")]
    Listing {
        scope: String,
        page: u32,
        #[source]
        source: SourceError,
    },

    /// The shutdown signal interrupted the pass.
    #[error("discovery pass cancelled")]
    Cancelled,

    /// The schedule expression is neither `once` nor a valid cron expression.
    #[error("invalid schedule '{expression}': {reason}")]
    Schedule { expression: String, reason: String },
}

impl FetcherError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<FetcherError> for SbomerError {
    fn from(err: FetcherError) -> Self {
        match err {
            FetcherError::Listing { source, .. } => SbomerError::Source(source),
            FetcherError::Cancelled => SbomerError::Pipeline(PipelineError::Cancelled),
            FetcherError::Schedule { expression, reason } => {
                SbomerError::Config(ConfigError::InvalidValue {
                    field: "fetcher.schedule".to_owned(),
                    reason: format!("'{expression}': {reason}"),
                })
            }
        }
    }
}
