//! # Abortable Signal Junction
//!
//! N-to-1 fan-in of completion signals. The parent succeeds once every
//! sub-signal has succeeded; the first sub-signal to fail or abort drives the
//! parent to that outcome instead. Nothing here blocks: the remaining-count is an
//! atomic, and failure/abort force it to zero with a compare-and-swap loop so a
//! racing success can never also reach zero and fire the parent.

use super::{AbortableSignal, Signal};
use crate::error::DeploymentError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

struct JunctionState {
    parent: Arc<dyn AbortableSignal>,
    remaining: AtomicUsize,
    failed: AtomicBool,
    aborted: AtomicBool,
}

impl JunctionState {
    fn decrement(&self) {
        let mut current = self.remaining.load(Ordering::Acquire);
        while current > 0 {
            match self.remaining.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if current == 1 {
                        self.parent.signal_successful_completion();
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns `true` for the caller that moved the count to zero
    fn force_zero(&self) -> bool {
        let mut current = self.remaining.load(Ordering::Acquire);
        while current > 0 {
            match self.remaining.compare_exchange_weak(
                current,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }
}

struct SubSignal {
    index: usize,
    state: Arc<JunctionState>,
    complete: AtomicBool,
}

impl SubSignal {
    fn latch(&self) -> bool {
        !self.complete.swap(true, Ordering::AcqRel)
    }
}

impl Signal for SubSignal {
    fn signal_successful_completion(&self) {
        if self.latch() {
            trace!(sub_signal = self.index, "Sub-signal succeeded");
            self.state.decrement();
        }
    }

    fn signal_failure(&self, cause: DeploymentError) {
        if self.latch() && self.state.force_zero() {
            trace!(sub_signal = self.index, error = %cause, "Sub-signal failed");
            self.state.failed.store(true, Ordering::Release);
            self.state.parent.signal_failure(cause);
        }
    }
}

impl AbortableSignal for SubSignal {
    fn signal_aborted(&self) {
        if self.latch() && self.state.force_zero() {
            trace!(sub_signal = self.index, "Sub-signal aborted");
            self.state.aborted.store(true, Ordering::Release);
            self.state.parent.signal_aborted();
        }
    }
}

pub struct AbortableSignalJunction {
    state: Arc<JunctionState>,
    sub_signals: Vec<Arc<SubSignal>>,
}

impl AbortableSignalJunction {
    /// Split `parent` into `size` sub-signals. A junction of size zero drives the
    /// parent to success immediately.
    pub fn new(parent: Arc<dyn AbortableSignal>, size: usize) -> Self {
        let state = Arc::new(JunctionState {
            parent,
            remaining: AtomicUsize::new(size),
            failed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        });

        let sub_signals = (0..size)
            .map(|index| {
                Arc::new(SubSignal {
                    index,
                    state: Arc::clone(&state),
                    complete: AtomicBool::new(false),
                })
            })
            .collect();

        if size == 0 {
            state.parent.signal_successful_completion();
        }

        Self { state, sub_signals }
    }

    pub fn sub_signals(&self) -> Vec<Arc<dyn AbortableSignal>> {
        self.sub_signals
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn AbortableSignal>)
            .collect()
    }

    pub fn size(&self) -> usize {
        self.sub_signals.len()
    }

    pub fn failed(&self) -> bool {
        self.state.failed.load(Ordering::Acquire)
    }

    pub fn aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::thread;

    /// Records every call it receives, without latching
    #[derive(Default)]
    struct RecordingSignal {
        calls: Mutex<Vec<&'static str>>,
    }

    impl RecordingSignal {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    impl Signal for RecordingSignal {
        fn signal_successful_completion(&self) {
            self.calls.lock().push("success");
        }

        fn signal_failure(&self, _cause: DeploymentError) {
            self.calls.lock().push("failure");
        }
    }

    impl AbortableSignal for RecordingSignal {
        fn signal_aborted(&self) {
            self.calls.lock().push("aborted");
        }
    }

    fn junction(size: usize) -> (Arc<RecordingSignal>, AbortableSignalJunction) {
        let parent = Arc::new(RecordingSignal::default());
        let junction = AbortableSignalJunction::new(parent.clone(), size);
        (parent, junction)
    }

    #[test]
    fn test_zero_size_succeeds_immediately() {
        let (parent, junction) = junction(0);
        assert_eq!(parent.calls(), vec!["success"]);
        assert!(junction.sub_signals().is_empty());
    }

    #[test]
    fn test_success_only_after_last_sub_signal() {
        let (parent, junction) = junction(3);
        let subs = junction.sub_signals();
        subs[0].signal_successful_completion();
        subs[2].signal_successful_completion();
        assert!(parent.calls().is_empty());
        subs[1].signal_successful_completion();
        assert_eq!(parent.calls(), vec!["success"]);
    }

    #[test]
    fn test_duplicate_sub_signal_calls_are_ignored() {
        let (parent, junction) = junction(2);
        let subs = junction.sub_signals();
        subs[0].signal_successful_completion();
        subs[0].signal_successful_completion();
        subs[0].signal_failure(DeploymentError::general("late"));
        assert!(parent.calls().is_empty());
        assert!(!junction.failed());
    }

    #[test]
    fn test_failure_after_partial_success_fails_parent() {
        let (parent, junction) = junction(3);
        let subs = junction.sub_signals();
        subs[0].signal_successful_completion();
        subs[1].signal_successful_completion();
        subs[2].signal_failure(DeploymentError::general("boom"));
        assert_eq!(parent.calls(), vec!["failure"]);
        assert!(junction.failed());
        assert!(!junction.aborted());
    }

    #[test]
    fn test_first_failure_wins() {
        let (parent, junction) = junction(3);
        let subs = junction.sub_signals();
        subs[1].signal_failure(DeploymentError::general("first"));
        subs[0].signal_aborted();
        subs[2].signal_successful_completion();
        subs[0].signal_successful_completion();
        assert_eq!(parent.calls(), vec!["failure"]);
        assert!(junction.failed());
        assert!(!junction.aborted());
    }

    #[test]
    fn test_abort_drives_parent_abort() {
        let (parent, junction) = junction(2);
        let subs = junction.sub_signals();
        subs[0].signal_aborted();
        subs[1].signal_failure(DeploymentError::general("late"));
        assert_eq!(parent.calls(), vec!["aborted"]);
        assert!(junction.aborted());
        assert!(!junction.failed());
    }

    #[test]
    fn test_concurrent_successes_fire_parent_once() {
        let (parent, junction) = junction(64);
        let handles: Vec<_> = junction
            .sub_signals()
            .into_iter()
            .map(|sub| thread::spawn(move || sub.signal_successful_completion()))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(parent.calls(), vec!["success"]);
    }
}
