//! # Trader Sandbox
//!
//! The isolated script environment a trader's strategy runs in: an embedded
//! `rhai` interpreter populated with the global constants, the trader's own
//! control handle and its exchange bindings.
//!
//! Scripts are halted cooperatively. External code posts an interruption on
//! the sandbox's bounded channel and the interpreter runs it at the next
//! instruction boundary, where it raises the halt signal. The halt surfaces as
//! [`ScriptError::Halted`] rather than as an ordinary script failure.

mod api;
pub mod binding;
pub mod constants;
pub mod control;
pub mod error;
pub mod interrupt;
pub mod sandbox;

// --- Public API ---
pub use binding::{BindingFactory, ExchangeBinding};
pub use constants::CONSTANTS;
pub use control::{ControlHandle, ScheduledTask, TraderControl};
pub use error::{InterruptError, SandboxError, ScriptError};
pub use interrupt::{Halt, Interrupt, InterruptHandle, InterruptReceiver};
pub use sandbox::{Sandbox, EXCHANGES_ALIASES, EXCHANGE_ALIASES, GLOBAL_ALIASES};
