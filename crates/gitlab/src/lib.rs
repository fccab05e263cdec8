//! GitLab collaborators of the sbomer pipeline.
//!
//! - [`GitLabClient`] implements `ProjectSource` on the REST API v4.
//! - [`GitCheckout`] implements `CheckoutProvider` with shallow clones into
//!   per-project directories.

pub mod checkout;
pub mod client;

pub use checkout::GitCheckout;
pub use client::GitLabClient;
