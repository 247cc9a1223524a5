//! Infrastructure layer for Cortex.
//!
//! Contains implementations of the repository traits defined in `cortex-core`
//! (SQLite storage), the `config.toml` loader, and data directory resolution.

pub mod config;
pub mod filesystem;
pub mod sqlite;
