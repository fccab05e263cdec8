//! Job processor.
//!
//! # Module Structure
//!
//! - [`syft`]: `SbomGenerator` implementation driving the `syft` CLI
//! - [`processor`]: the per-item state machine ([`JobProcessor`])
//! - [`service`]: worker lanes and the `Pipeline` lifecycle ([`ProcessorService`])
//! - [`error`]: [`ProcessorError`] and its ack/requeue [`Disposition`]
//!
//! # Architecture
//!
//! ```text
//! discovery queue --> Subscription --> lane 0..prefetch
//!                                          |
//!                                     JobProcessor
//!                       +-------------+----+--------+-------------+
//!                       |             |             |             |
//!               CheckoutProvider  SbomGenerator  ResultStore   Publisher
//!                                                                 |
//!                                                     downstream scan requests
//! ```

pub mod error;
pub mod processor;
pub mod service;
pub mod syft;

pub use error::{Disposition, ProcessorError};
pub use processor::{DownstreamTarget, JobProcessor, Phase, SBOM_FILE_NAME};
pub use service::ProcessorService;
pub use syft::SyftGenerator;
