//! # Trader Events
//!
//! This crate defines the trader event log: the structured entries emitted by
//! the lifecycle controller, running scripts and exchange bindings, and the
//! `EventSink` abstraction they are delivered through.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;
pub mod sink;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{LogLevel, TraderEvent, GLOBAL_EXCHANGE_TYPE};
pub use sink::{BroadcastSink, EventSink, FanoutSink, MemorySink, TraderLogger, TracingSink};
