//! # Completion Signals
//!
//! Single-use notification sinks used to observe asynchronous module activation.
//!
//! A signal is created by a caller, handed to an asynchronous operation and fired
//! at most once: success, failure with a cause, or (for [`AbortableSignal`])
//! aborted. Every implementation in this module latches on the first call; later
//! calls are silently ignored because activation callbacks may race with callers
//! that drive completion themselves.
//!
//! - [`BlockingSignal`] lets a caller wait, synchronously or asynchronously
//! - [`AbortableSignalJunction`] fans one parent signal out into N sub-signals

pub mod blocking;
pub mod junction;

pub use blocking::BlockingSignal;
pub use junction::AbortableSignalJunction;

use crate::error::DeploymentError;

/// Completion sink for an asynchronous operation
pub trait Signal: Send + Sync {
    /// Report that the operation completed successfully
    fn signal_successful_completion(&self);

    /// Report that the operation failed
    fn signal_failure(&self, cause: DeploymentError);
}

/// A [`Signal`] that can additionally report that the operation was abandoned
pub trait AbortableSignal: Signal {
    fn signal_aborted(&self);
}

/// Signal that discards every outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSignal;

impl Signal for NoopSignal {
    fn signal_successful_completion(&self) {}

    fn signal_failure(&self, _cause: DeploymentError) {}
}

impl AbortableSignal for NoopSignal {
    fn signal_aborted(&self) {}
}
