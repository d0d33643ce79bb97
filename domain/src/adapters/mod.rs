//! In-memory adapters that live inside the domain crate for convenience.
//!
//! Intended for unit tests, local demos and the `memory` storage provider of
//! the CLI. Durable adapters (SQLite) live in separate crates.

pub mod memory_repo;
