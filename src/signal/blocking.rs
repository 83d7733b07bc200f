use super::{AbortableSignal, Signal};
use crate::error::{DeploymentError, Result};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone)]
enum Outcome {
    Success,
    Failure(DeploymentError),
    Aborted,
}

/// Signal that a caller can wait on.
///
/// Constructed with `block = false` the waiting methods never wait and only report
/// the current completion state. Waiting methods return `Ok(true)` on success,
/// `Ok(false)` when the wait ended without success (timed out or aborted; use
/// [`BlockingSignal::is_aborted`] to tell them apart) and `Err` carrying the
/// original cause when the operation failed.
#[derive(Debug)]
pub struct BlockingSignal {
    block: bool,
    outcome: Mutex<Option<Outcome>>,
    completed: Condvar,
    notify: Notify,
}

impl BlockingSignal {
    pub fn new(block: bool) -> Self {
        Self {
            block,
            outcome: Mutex::new(None),
            completed: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Wait up to `timeout` for completion.
    ///
    /// A timeout too large to express as a deadline waits without limit.
    pub fn await_completion(&self, timeout: Duration) -> Result<bool> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.check_complete();
        };
        let mut outcome = self.outcome.lock();
        if self.block {
            while outcome.is_none() {
                if self
                    .completed
                    .wait_until(&mut outcome, deadline)
                    .timed_out()
                {
                    debug!(timeout_ms = timeout.as_millis() as u64, "Signal wait timed out");
                    break;
                }
            }
        }
        Self::interpret(outcome.as_ref())
    }

    /// Wait without a timeout for completion
    pub fn check_complete(&self) -> Result<bool> {
        let mut outcome = self.outcome.lock();
        if self.block {
            while outcome.is_none() {
                self.completed.wait(&mut outcome);
            }
        }
        Self::interpret(outcome.as_ref())
    }

    /// Asynchronous counterpart of [`BlockingSignal::check_complete`].
    ///
    /// Always waits, regardless of the `block` flag.
    pub async fn wait(&self) -> Result<bool> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let outcome = self.outcome.lock();
                if outcome.is_some() {
                    return Self::interpret(outcome.as_ref());
                }
            }
            notified.await;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome.lock().is_some()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(*self.outcome.lock(), Some(Outcome::Aborted))
    }

    fn interpret(outcome: Option<&Outcome>) -> Result<bool> {
        match outcome {
            Some(Outcome::Success) => Ok(true),
            Some(Outcome::Failure(cause)) => Err(cause.clone()),
            Some(Outcome::Aborted) | None => Ok(false),
        }
    }

    fn complete(&self, result: Outcome) {
        let mut outcome = self.outcome.lock();
        if outcome.is_some() {
            return;
        }
        *outcome = Some(result);
        self.completed.notify_all();
        drop(outcome);
        self.notify.notify_waiters();
    }
}

impl Default for BlockingSignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Signal for BlockingSignal {
    fn signal_successful_completion(&self) {
        self.complete(Outcome::Success);
    }

    fn signal_failure(&self, cause: DeploymentError) {
        self.complete(Outcome::Failure(cause));
    }
}

impl AbortableSignal for BlockingSignal {
    fn signal_aborted(&self) {
        self.complete(Outcome::Aborted);
    }
}
