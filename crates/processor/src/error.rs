//! Job processor errors.
//!
//! Every failure of a work item carries a [`Disposition`] telling the
//! worker lane what to do with the originating delivery:
//!
//! | Failure | Disposition |
//! |---------|-------------|
//! | malformed payload | `Ack` |
//! | checkout | `Ack` |
//! | SBOM generation or reading its output | `Ack` |
//! | downstream publish | `Ack` |
//! | result store | `Requeue` |
//! | shutdown between phases | `Requeue` |

use sbomer_core::error::{
    CheckoutError, GeneratorError, ParseError, PipelineError, SbomerError, StorageError,
};
use sbomer_queue::QueueError;

/// What happens to the delivery after a failed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Settle the message; it will not be redelivered.
    Ack,
    /// Release the message for redelivery.
    Requeue,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The message body is not a valid work item.
    #[error("malformed work item: {0}")]
    Malformed(#[from] ParseError),

    /// Cloning the project failed.
    #[error("checkout failed: {0}")]
    Checkout(#[from] CheckoutError),

    /// The SBOM tool failed.
    #[error("sbom generation failed: {0}")]
    Generator(#[from] GeneratorError),

    /// The tool succeeded but its output could not be read.
    #[error("failed to read sbom at {path}: {source}")]
    ReadSbom {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Persisting the record failed.
    #[error("failed to persist sbom: {0}")]
    Storage(#[from] StorageError),

    /// The scan request event could not be encoded.
    #[error("failed to encode scan request: {0}")]
    Encode(String),

    /// The scan request could not be published downstream.
    #[error("failed to publish scan request: {0}")]
    Publish(#[source] QueueError),

    /// Shutdown was signalled before the next phase started.
    #[error("processing interrupted by shutdown")]
    Cancelled,
}

impl ProcessorError {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Storage(_) | Self::Cancelled => Disposition::Requeue,
            Self::Malformed(_)
            | Self::Checkout(_)
            | Self::Generator(_)
            | Self::ReadSbom { .. }
            | Self::Encode(_)
            | Self::Publish(_) => Disposition::Ack,
        }
    }

    /// Metric label for the item outcome.
    pub fn result_label(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            _ if self.disposition() == Disposition::Requeue => "requeued",
            _ => "failed",
        }
    }
}

impl From<ProcessorError> for SbomerError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Malformed(e) => SbomerError::Parse(e),
            ProcessorError::Checkout(e) => SbomerError::Checkout(e),
            ProcessorError::Generator(e) => SbomerError::Generator(e),
            ProcessorError::ReadSbom { source, .. } => SbomerError::Io(source),
            ProcessorError::Storage(e) => SbomerError::Storage(e),
            ProcessorError::Publish(e) => e.into(),
            ProcessorError::Encode(msg) => SbomerError::Queue(msg),
            ProcessorError::Cancelled => SbomerError::Pipeline(PipelineError::Cancelled),
        }
    }
}
