use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Why a script run ended without completing normally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The run was halted through the interruption channel. This is a
    /// successful cancellation, not a fault.
    #[error("halted")]
    Halted,

    /// The script raised an error or hit a sandbox limit.
    #[error("{0}")]
    Runtime(String),
}

/// Why an interruption could not be posted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptError {
    #[error("an interruption is already pending")]
    Pending,

    #[error("the sandbox is no longer running")]
    Closed,
}
