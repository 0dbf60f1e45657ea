//! BlipMQ lists – the in-memory collections behind every BlipMQ destination.
//!
//! This crate exports
//!  * `lists`   – priority FIFO sets and maps with limits, events and views
//!  * `config`  – TOML/env defaults for new collections
//!  * `logging` – the `tracing` subscriber used by the binary and tests
//!
//! Destination and dispatch layers consume the collections through
//! [`NflPriorityFifoSet`] and [`SimpleNflHashMap`].

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod lists;
pub mod logging;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{ConfigError, ListsConfig};
pub use lists::{ListError, NflPriorityFifoSet, SimpleNflHashMap};
