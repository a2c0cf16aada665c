//! Error types for crosswire.

use std::thread::ThreadId;

/// The main error type for crosswire operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Signal-related error.
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),
    /// Event loop error.
    #[error("event loop error: {0}")]
    Loop(#[from] LoopError),
    /// Timer-related error.
    #[error("timer error: {0}")]
    Timer(#[from] TimerError),
    /// Thread bootstrap error.
    #[error("thread error: {0}")]
    Thread(#[from] ThreadError),
}

/// Errors raised while binding a slot to a signal.
///
/// These are returned before any connection exists; a failed connect leaves
/// both the signal and the endpoints untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// The slot's parameters are not an ordered subsequence of the signal's.
    #[error("slot ({slot}) cannot bind to signal ({signal}): no remaining `{missing}` argument")]
    SignatureMismatch {
        /// The slot's parameter types.
        slot: String,
        /// The signal's parameter types.
        signal: String,
        /// The first slot parameter that could not be matched.
        missing: &'static str,
    },
}

/// Errors raised when routing work to an event loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoopError {
    /// No event loop is registered for the target thread.
    #[error("no event loop is running on thread {0:?}")]
    NoEventLoop(ThreadId),
    /// The event loop shut down before the work was executed.
    #[error("event loop has shut down")]
    Closed,
    /// A blocking send targeted the calling thread's own loop.
    #[error("blocking send to the calling thread's own event loop would deadlock")]
    WouldDeadlock,
    /// An event loop already exists on this thread.
    #[error("an event loop is already registered for thread {0:?}")]
    AlreadyRunning(ThreadId),
}

/// Timer-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// The timer ID is invalid or has already been removed.
    #[error("invalid or expired timer ID")]
    InvalidTimerId,
}

/// Errors raised while starting a worker thread.
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    /// The OS refused to spawn the thread.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The worker exited before its event loop was registered.
    #[error("worker thread exited before its event loop started")]
    LoopStartFailed,
}

/// A specialized Result type for crosswire operations.
pub type Result<T> = std::result::Result<T, Error>;
