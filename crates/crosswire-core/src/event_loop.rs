//! Per-thread event loops.
//!
//! Each worker thread runs at most one [`EventLoop`]. The loop owns a FIFO
//! queue of deferred closures and a timer table; other threads reach it
//! through a cloneable [`LoopHandle`] obtained from the loop itself or from
//! the [registry](crate::registry).
//!
//! # Example
//!
//! ```
//! use crosswire_core::EventLoop;
//! use std::time::Duration;
//!
//! let handle = std::thread::spawn(|| {
//!     let event_loop = EventLoop::new().unwrap();
//!     let quitter = event_loop.handle();
//!     event_loop
//!         .handle()
//!         .set_single_shot_timer(Duration::from_millis(5), move || quitter.quit())
//!         .unwrap();
//!     event_loop.run();
//! });
//! handle.join().unwrap();
//! ```

use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use parking_lot::Mutex;

use crate::error::{LoopError, TimerError};
use crate::invocation::{Completion, CompletionWaiter, QueuedInvocation, completion_pair};
use crate::logging::targets;
use crate::registry::event_loop_registry;
use crate::timer::{TimerId, TimerManager};

/// Messages delivered to a loop's queue.
enum LoopMessage {
    /// Run a deferred closure.
    Invoke(QueuedInvocation),
    /// Re-evaluate the timer table.
    Wake,
    /// Leave `run()`.
    Quit,
}

struct LoopShared {
    thread: ThreadId,
    sender: Sender<LoopMessage>,
    timers: Mutex<TimerManager>,
}

/// A cloneable, thread-safe handle to an event loop.
///
/// Handles stay valid after the loop is dropped; operations then fail with
/// [`LoopError::Closed`].
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<LoopShared>,
}

impl LoopHandle {
    /// The thread this loop runs on.
    pub fn thread_id(&self) -> ThreadId {
        self.shared.thread
    }

    /// Whether this handle refers to the same loop as `other`.
    pub fn same_loop(&self, other: &LoopHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Queue `f` to run on the loop thread and return immediately.
    ///
    /// Posted closures run in FIFO order relative to each other.
    pub fn post_event<F>(&self, f: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send_message(LoopMessage::Invoke(QueuedInvocation::new(f)))
    }

    /// Queue `f` and block until the loop has executed it.
    ///
    /// Fails with [`LoopError::WouldDeadlock`] when called from the loop's
    /// own thread, and with [`LoopError::Closed`] if the loop shuts down
    /// before running `f`.
    pub fn send_event<F>(&self, f: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.begin_send(f)?.wait() {
            Completion::Done => Ok(()),
            Completion::Abandoned => Err(LoopError::Closed),
        }
    }

    /// Queue `f` with a completion waiter, without waiting yet.
    pub(crate) fn begin_send<F>(&self, f: F) -> Result<CompletionWaiter, LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        if thread::current().id() == self.shared.thread {
            return Err(LoopError::WouldDeadlock);
        }
        let (handle, waiter) = completion_pair();
        self.send_message(LoopMessage::Invoke(QueuedInvocation::with_completion(f, handle)))?;
        Ok(waiter)
    }

    /// Run `f` once on the loop after `interval`.
    ///
    /// A zero interval runs `f` on the loop's next iteration.
    pub fn set_single_shot_timer<F>(&self, interval: Duration, f: F) -> Result<TimerId, LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.shared.timers.lock().start_one_shot(interval, f);
        self.wake()?;
        Ok(id)
    }

    /// Run `f` on the loop every `interval` until the timer is killed.
    pub fn set_repeat_timer<F>(&self, interval: Duration, f: F) -> Result<TimerId, LoopError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.shared.timers.lock().start_repeating(interval, f);
        self.wake()?;
        Ok(id)
    }

    /// Cancel a timer.
    ///
    /// A tick already collected by the loop may still run once.
    pub fn kill_timer(&self, id: TimerId) -> Result<(), TimerError> {
        self.shared.timers.lock().stop(id)
    }

    /// Whether timer `id` is still scheduled.
    pub fn is_timer_active(&self, id: TimerId) -> bool {
        self.shared.timers.lock().is_active(id)
    }

    /// Ask the loop to leave `run()` once the closures queued before this
    /// call have executed.
    pub fn quit(&self) {
        if self.send_message(LoopMessage::Quit).is_err() {
            tracing::debug!(target: targets::EVENT_LOOP, thread = ?self.shared.thread, "quit sent to closed loop");
        }
    }

    fn wake(&self) -> Result<(), LoopError> {
        self.send_message(LoopMessage::Wake)
    }

    fn send_message(&self, message: LoopMessage) -> Result<(), LoopError> {
        self.shared.sender.send(message).map_err(|_| LoopError::Closed)
    }
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("thread", &self.shared.thread)
            .finish_non_exhaustive()
    }
}

/// An event loop bound to the thread that created it.
///
/// Creating the loop registers it for the current thread; dropping it
/// deregisters it and releases any sender still blocked on a queued
/// closure. `EventLoop` is neither `Send` nor `Sync`: control it from its
/// own thread and hand out [`LoopHandle`]s to everyone else.
pub struct EventLoop {
    handle: LoopHandle,
    receiver: Receiver<LoopMessage>,
    _not_send: PhantomData<*const ()>,
}

impl EventLoop {
    /// Create and register an event loop for the calling thread.
    pub fn new() -> Result<Self, LoopError> {
        let (sender, receiver) = unbounded();
        let handle = LoopHandle {
            shared: Arc::new(LoopShared {
                thread: thread::current().id(),
                sender,
                timers: Mutex::new(TimerManager::new()),
            }),
        };
        event_loop_registry().register(handle.clone())?;
        tracing::debug!(target: targets::EVENT_LOOP, thread = ?handle.thread_id(), "event loop created");

        Ok(Self {
            handle,
            receiver,
            _not_send: PhantomData,
        })
    }

    /// A handle other threads can use to reach this loop.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// The thread this loop runs on.
    pub fn thread_id(&self) -> ThreadId {
        self.handle.thread_id()
    }

    /// Queue `f` on this loop. See [`LoopHandle::post_event`].
    pub fn post_event<F>(&self, f: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.post_event(f)
    }

    /// Blocking send. Always fails with [`LoopError::WouldDeadlock`] when
    /// called on the loop's own thread, which is the only place an
    /// `EventLoop` can be used from.
    pub fn send_event<F>(&self, f: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.send_event(f)
    }

    /// Ask the loop to leave `run()`.
    pub fn quit(&self) {
        self.handle.quit();
    }

    /// Run the loop until [`quit`](Self::quit) is requested.
    ///
    /// Each iteration waits for a message or the next timer deadline, drains
    /// the queued closures in FIFO order, then fires due timers.
    pub fn run(&self) {
        tracing::debug!(target: targets::EVENT_LOOP, thread = ?self.thread_id(), "event loop running");

        loop {
            let timeout = self.handle.shared.timers.lock().time_until_next();
            let message = match timeout {
                Some(timeout) => self.receiver.recv_timeout(timeout),
                None => self
                    .receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match message {
                Ok(message) => {
                    if self.dispatch(message).is_break() || self.drain().is_break() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            self.fire_timers();
        }

        tracing::debug!(target: targets::EVENT_LOOP, thread = ?self.thread_id(), "event loop stopped");
    }

    /// Run everything that is ready right now without blocking.
    ///
    /// Returns the number of closures and timer callbacks executed. A quit
    /// request stops the drain early.
    pub fn process_events(&self) -> usize {
        let mut executed = 0;
        let pending = self.receiver.len();
        for _ in 0..pending {
            match self.receiver.try_recv() {
                Ok(LoopMessage::Invoke(invocation)) => {
                    invocation.execute();
                    executed += 1;
                }
                Ok(LoopMessage::Wake) => {}
                Ok(LoopMessage::Quit) => return executed,
                Err(_) => break,
            }
        }
        executed + self.fire_timers()
    }

    fn dispatch(&self, message: LoopMessage) -> ControlFlow<()> {
        match message {
            LoopMessage::Invoke(invocation) => {
                invocation.execute();
                ControlFlow::Continue(())
            }
            LoopMessage::Wake => ControlFlow::Continue(()),
            LoopMessage::Quit => ControlFlow::Break(()),
        }
    }

    fn drain(&self) -> ControlFlow<()> {
        // Bounded by the queue length at entry so closures that re-post
        // themselves cannot starve the timers.
        for _ in 0..self.receiver.len() {
            match self.receiver.try_recv() {
                Ok(message) => {
                    if self.dispatch(message).is_break() {
                        return ControlFlow::Break(());
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ControlFlow::Continue(())
    }

    fn fire_timers(&self) -> usize {
        // Collected under the lock, run outside it.
        let due = self.handle.shared.timers.lock().process_expired();
        let count = due.len();
        for callback in due {
            callback();
        }
        count
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        event_loop_registry().deregister(&self.handle);
        // Dropping queued invocations releases any blocked senders.
        let abandoned = self.receiver.try_iter().count();
        tracing::debug!(target: targets::EVENT_LOOP, thread = ?self.thread_id(), abandoned, "event loop destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spawn_loop() -> (LoopHandle, thread::JoinHandle<()>) {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let join = thread::spawn(move || {
            let event_loop = EventLoop::new().unwrap();
            ready_tx.send(event_loop.handle()).unwrap();
            event_loop.run();
        });
        (ready_rx.recv().unwrap(), join)
    }

    #[test]
    fn test_post_event_runs_in_fifo_order_on_loop_thread() {
        let (handle, join) = spawn_loop();
        let loop_thread = handle.thread_id();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = order.clone();
            handle
                .post_event(move || {
                    assert_eq!(thread::current().id(), loop_thread);
                    order.lock().push(i);
                })
                .unwrap();
        }
        handle.quit();
        join.join().unwrap();

        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_send_event_blocks_until_executed() {
        let (handle, join) = spawn_loop();
        let value = Arc::new(AtomicUsize::new(0));

        let value_clone = value.clone();
        handle
            .send_event(move || {
                thread::sleep(Duration::from_millis(20));
                value_clone.store(7, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(value.load(Ordering::SeqCst), 7);

        handle.quit();
        join.join().unwrap();
    }

    #[test]
    fn test_send_event_from_own_thread_is_rejected() {
        let event_loop = EventLoop::new().unwrap();
        assert_eq!(event_loop.send_event(|| {}), Err(LoopError::WouldDeadlock));
    }

    #[test]
    fn test_send_event_after_quit_reports_closed() {
        let (handle, join) = spawn_loop();
        handle.quit();
        join.join().unwrap();

        assert_eq!(handle.send_event(|| {}), Err(LoopError::Closed));
        assert_eq!(handle.post_event(|| {}), Err(LoopError::Closed));
    }

    #[test]
    fn test_single_shot_timer_fires_once() {
        let (handle, join) = spawn_loop();
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_clone = fired.clone();
        let id = handle
            .set_single_shot_timer(Duration::from_millis(5), move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!handle.is_timer_active(id));
        assert_eq!(handle.kill_timer(id), Err(TimerError::InvalidTimerId));

        handle.quit();
        join.join().unwrap();
    }

    #[test]
    fn test_repeat_timer_fires_until_killed() {
        let (handle, join) = spawn_loop();
        let ticks = Arc::new(AtomicUsize::new(0));

        let ticks_clone = ticks.clone();
        let id = handle
            .set_repeat_timer(Duration::from_millis(5), move || {
                ticks_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        thread::sleep(Duration::from_millis(80));
        handle.kill_timer(id).unwrap();
        let after_kill = ticks.load(Ordering::SeqCst);
        assert!(after_kill >= 2, "expected repeated ticks, got {after_kill}");

        thread::sleep(Duration::from_millis(40));
        // At most one tick already collected may still land after the kill.
        assert!(ticks.load(Ordering::SeqCst) <= after_kill + 1);

        handle.quit();
        join.join().unwrap();
    }

    #[test]
    fn test_process_events_drains_without_blocking() {
        let event_loop = EventLoop::new().unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            event_loop
                .post_event(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        assert_eq!(event_loop.process_events(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(event_loop.process_events(), 0);
    }

    #[test]
    fn test_dropping_loop_releases_blocked_sender() {
        let (handle_tx, handle_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        let owner = thread::spawn(move || {
            let event_loop = EventLoop::new().unwrap();
            handle_tx.send(event_loop.handle()).unwrap();
            // Never runs the loop; drop it once the send is queued.
            release_rx.recv().unwrap();
            drop(event_loop);
        });

        let handle: LoopHandle = handle_rx.recv().unwrap();
        let sender = thread::spawn(move || handle.send_event(|| {}));

        thread::sleep(Duration::from_millis(20));
        release_tx.send(()).unwrap();

        assert_eq!(sender.join().unwrap(), Err(LoopError::Closed));
        owner.join().unwrap();
    }
}
