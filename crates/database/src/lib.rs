//! # Trader Storage
//!
//! This crate is the storage service of the trader runner: it loads traders,
//! users, strategies and exchange accounts, and can persist the trader event log.
//!
//! ## Public API
//!
//! - `TraderStore`: the abstract storage interface the lifecycle controller consumes.
//! - `DbRepository`: the PostgreSQL implementation, built on a `PgPool`.
//! - `MemoryStore`: an in-memory implementation for dry runs and tests.
//! - `DbLogSink`: an `EventSink` writing events to the `trader_logs` table.
//! - `connect` / `run_migrations`: pool construction and schema setup.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod log_sink;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use log_sink::DbLogSink;
pub use repository::DbRepository;
pub use store::{MemoryStore, TraderStore};
