//! Discovery scheduler.
//!
//! [`Fetcher::run_pass`] pages through the platform's project listing and
//! publishes one work item per project; [`FetcherService`] drives passes
//! from a [`Schedule`] as a daemon stage.

pub mod error;
pub mod fetcher;
pub mod schedule;
pub mod service;

pub use error::FetcherError;
pub use fetcher::{Fetcher, FetcherSettings, PassReport};
pub use schedule::{Schedule, next_fire};
pub use service::FetcherService;
