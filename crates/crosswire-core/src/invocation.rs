//! Deferred invocations and completion tracking for blocking delivery.
//!
//! A [`QueuedInvocation`] wraps a closure destined for another thread's
//! event loop. Blocking deliveries attach a [`CompletionHandle`]; the sender
//! keeps the matching [`CompletionWaiter`] and parks on it until the loop has
//! run the closure.
//!
//! If the invocation is dropped without running (its loop shut down with the
//! invocation still queued), the handle reports [`Completion::Abandoned`] so
//! a blocked sender is always released.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A type-erased closure queued for execution on an event loop.
pub struct QueuedInvocation {
    /// The actual invocation closure.
    invoke: Box<dyn FnOnce() + Send>,
    /// Optional completion notifier for blocking deliveries.
    completion: Option<CompletionHandle>,
}

impl QueuedInvocation {
    /// Create a new queued invocation.
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: None,
        }
    }

    /// Create a new queued invocation with a completion handle for blocking.
    pub fn with_completion<F>(invoke: F, completion: CompletionHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: Some(completion),
        }
    }

    /// Execute the invocation.
    pub fn execute(self) {
        (self.invoke)();
        if let Some(completion) = self.completion {
            completion.finish(Completion::Done);
        }
    }
}

/// How a blocking invocation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The closure ran to completion.
    Done,
    /// The closure was dropped without running.
    Abandoned,
}

/// The loop-side half of a completion pair.
pub struct CompletionHandle {
    inner: Option<Arc<CompletionState>>,
}

impl CompletionHandle {
    fn finish(mut self, outcome: Completion) {
        if let Some(state) = self.inner.take() {
            state.finish(outcome);
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if let Some(state) = self.inner.take() {
            state.finish(Completion::Abandoned);
        }
    }
}

/// The sender-side half of a completion pair.
pub struct CompletionWaiter {
    inner: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Block until the invocation completes or is abandoned.
    pub fn wait(self) -> Completion {
        let mut outcome = self.inner.outcome.lock();
        loop {
            if let Some(outcome) = *outcome {
                return outcome;
            }
            self.inner.condvar.wait(&mut outcome);
        }
    }

    /// Wait with a timeout.
    ///
    /// Returns `None` if the timeout elapsed first.
    pub fn wait_timeout(self, timeout: Duration) -> Option<Completion> {
        let mut outcome = self.inner.outcome.lock();
        if outcome.is_none() {
            self.inner.condvar.wait_for(&mut outcome, timeout);
        }
        *outcome
    }
}

struct CompletionState {
    outcome: Mutex<Option<Completion>>,
    condvar: Condvar,
}

impl CompletionState {
    fn finish(&self, outcome: Completion) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.condvar.notify_all();
    }
}

/// Create a completion handle/waiter pair for blocking invocations.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState {
        outcome: Mutex::new(None),
        condvar: Condvar::new(),
    });

    (
        CompletionHandle {
            inner: Some(state.clone()),
        },
        CompletionWaiter { inner: state },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_execute_runs_closure() {
        let executed = Arc::new(AtomicBool::new(false));

        let executed_clone = executed.clone();
        let invocation = QueuedInvocation::new(move || {
            executed_clone.store(true, Ordering::SeqCst);
        });

        invocation.execute();
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_completion_pair() {
        let (handle, waiter) = completion_pair();

        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            handle.finish(Completion::Done);
        });

        assert_eq!(waiter.wait(), Completion::Done);
        thread.join().unwrap();
    }

    #[test]
    fn test_completion_with_invocation() {
        let executed = Arc::new(AtomicBool::new(false));
        let (handle, waiter) = completion_pair();

        let executed_clone = executed.clone();
        let invocation = QueuedInvocation::with_completion(
            move || {
                executed_clone.store(true, Ordering::SeqCst);
            },
            handle,
        );

        // Simulate an event loop running the invocation on another thread.
        let thread = std::thread::spawn(move || invocation.execute());

        assert_eq!(waiter.wait(), Completion::Done);
        thread.join().unwrap();
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_invocation_is_abandoned() {
        let (handle, waiter) = completion_pair();
        let invocation = QueuedInvocation::with_completion(|| {}, handle);

        drop(invocation);
        assert_eq!(waiter.wait(), Completion::Abandoned);
    }

    #[test]
    fn test_completion_timeout() {
        let (_handle, waiter) = completion_pair();
        assert_eq!(waiter.wait_timeout(Duration::from_millis(10)), None);
    }
}
