// Error types for the signal-source seam
// Coordinator operations themselves never fail; out-of-range calls are clamped

use thiserror::Error;

/// Errors raised while wiring a coordinator to OS signals
#[derive(Debug, Error)]
pub enum Error {
    /// The OS refused to install the signal handler
    #[error("failed to register signal handler: {0}")]
    SignalRegistration(#[from] std::io::Error),

    /// A configured signal name has no known number
    #[error("unknown signal name: {0}")]
    UnknownSignal(String),

    /// The signal exists but cannot be caught (SIGKILL, SIGSTOP, ...)
    #[error("signal {0} cannot be handled")]
    ForbiddenSignal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
