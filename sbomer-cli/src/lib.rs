//! sbomer CLI library.
//!
//! Subcommand handlers are generic over the queue and store traits so the
//! in-memory backends can drive them in tests.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
