//! Result store implementations.
//!
//! - [`PgResultStore`]: PostgreSQL via `sqlx`, schema managed by the
//!   embedded migrations in `migrations/`.
//! - [`MemoryResultStore`]: process-local, for tests and dry runs.
//!
//! SBOM records are upserted by project uid (last writer wins), audit
//! entries and batch statistics are append-only.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryResultStore;
pub use postgres::{PgResultStore, connect, migrate};
pub use sqlx::PgPool;
