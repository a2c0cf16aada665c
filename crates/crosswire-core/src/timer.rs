//! Timers driven by per-thread event loops.
//!
//! Every [`EventLoop`](crate::EventLoop) owns a [`TimerManager`]; callbacks
//! scheduled through [`LoopHandle::set_single_shot_timer`] and
//! [`LoopHandle::set_repeat_timer`] run on that loop's thread. [`Timer`] is an
//! object wrapper that emits its `timeout` signal on every tick.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::{LoopError, TimerError};
use crate::event_loop::LoopHandle;
use crate::logging::targets;
use crate::object::{Object, ObjectBase};
use crate::registry::current_event_loop;
use crate::signal::Signal;

new_key_type! {
    /// A unique identifier for a timer.
    pub struct TimerId;
}

type RepeatingCallback = Arc<dyn Fn() + Send + Sync>;

/// A callback that is ready to run.
pub(crate) type ExpiredCallback = Box<dyn FnOnce() + Send>;

enum TimerCallback {
    Once(ExpiredCallback),
    Repeating(RepeatingCallback),
}

struct TimerData {
    next_fire: Instant,
    interval: Duration,
    /// Taken when a one-shot timer fires.
    callback: Option<TimerCallback>,
}

/// An entry in the timer queue (min-heap by fire time).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.fire_time.cmp(&self.fire_time)
    }
}

/// Pending timers of one event loop.
pub struct TimerManager {
    timers: SlotMap<TimerId, TimerData>,
    queue: BinaryHeap<TimerQueueEntry>,
}

impl TimerManager {
    /// Create a new timer manager.
    pub fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
        }
    }

    /// Schedule `callback` to run once after `interval`.
    pub fn start_one_shot<F>(&mut self, interval: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert(interval, TimerCallback::Once(Box::new(callback)))
    }

    /// Schedule `callback` to run every `interval`, starting one interval from now.
    pub fn start_repeating<F>(&mut self, interval: Duration, callback: F) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.insert(interval, TimerCallback::Repeating(Arc::new(callback)))
    }

    fn insert(&mut self, interval: Duration, callback: TimerCallback) -> TimerId {
        let next_fire = Instant::now() + interval;
        let id = self.timers.insert(TimerData {
            next_fire,
            interval,
            callback: Some(callback),
        });
        self.queue.push(TimerQueueEntry {
            id,
            fire_time: next_fire,
        });
        tracing::trace!(target: targets::TIMER, ?id, ?interval, "timer started");
        id
    }

    /// Stop and remove a timer.
    ///
    /// Returns an error if the timer is unknown or has already finished.
    pub fn stop(&mut self, id: TimerId) -> Result<(), TimerError> {
        match self.timers.remove(id) {
            Some(_) => {
                tracing::trace!(target: targets::TIMER, ?id, "timer stopped");
                Ok(())
            }
            None => Err(TimerError::InvalidTimerId),
        }
    }

    /// Check if a timer is still scheduled.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// Get the duration until the next timer fires, if any.
    pub fn time_until_next(&mut self) -> Option<Duration> {
        // Stopped timers leave their queue entries behind.
        while let Some(entry) = self.queue.peek() {
            if self.timers.contains_key(entry.id) {
                break;
            }
            self.queue.pop();
        }

        self.queue
            .peek()
            .map(|entry| entry.fire_time.saturating_duration_since(Instant::now()))
    }

    /// Collect the callbacks of every timer that is due.
    ///
    /// One-shot timers are removed. Repeating timers are rescheduled only
    /// after the scan, so each is collected at most once per call even with
    /// a zero interval.
    #[tracing::instrument(skip(self), target = "crosswire_core::timer", level = "trace")]
    pub fn process_expired(&mut self) -> Vec<ExpiredCallback> {
        let now = Instant::now();
        let mut expired: Vec<ExpiredCallback> = Vec::new();
        let mut rescheduled = Vec::new();

        while let Some(entry) = self.queue.peek() {
            if entry.fire_time > now {
                break;
            }
            let Some(entry) = self.queue.pop() else {
                break;
            };
            let id = entry.id;

            let Some(timer) = self.timers.get_mut(id) else {
                continue;
            };
            // A stale entry from before a reschedule.
            if timer.next_fire != entry.fire_time {
                continue;
            }

            tracing::trace!(target: targets::TIMER, ?id, "timer fired");
            match timer.callback.take() {
                Some(TimerCallback::Once(callback)) => {
                    self.timers.remove(id);
                    expired.push(callback);
                }
                Some(TimerCallback::Repeating(callback)) => {
                    let tick = callback.clone();
                    timer.callback = Some(TimerCallback::Repeating(callback));
                    timer.next_fire = now + timer.interval;
                    rescheduled.push(TimerQueueEntry {
                        id,
                        fire_time: timer.next_fire,
                    });
                    expired.push(Box::new(move || tick()));
                }
                None => {
                    self.timers.remove(id);
                }
            }
        }

        self.queue.extend(rescheduled);
        expired
    }

    /// Get the number of scheduled timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

struct ActiveTimer {
    event_loop: LoopHandle,
    id: TimerId,
}

/// A repeating timer object that emits [`timeout`](Timer::timeout) on every tick.
///
/// The timer runs on the event loop of the thread that started it. Dropping
/// the timer stops it.
///
/// # Example
///
/// ```
/// use crosswire_core::{EventLoop, Timer};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// std::thread::spawn(|| {
///     let event_loop = EventLoop::new().unwrap();
///     let timer = Arc::new(Timer::new());
///     let ticks = Arc::new(AtomicUsize::new(0));
///
///     let counter = ticks.clone();
///     let stopper = timer.clone();
///     let quitter = event_loop.handle();
///     timer
///         .timeout()
///         .connect(move || {
///             if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
///                 stopper.stop();
///                 quitter.quit();
///             }
///         })
///         .unwrap();
///
///     timer.start(Duration::from_millis(1)).unwrap();
///     event_loop.run();
///     assert_eq!(ticks.load(Ordering::SeqCst), 3);
/// })
/// .join()
/// .unwrap();
/// ```
pub struct Timer {
    base: ObjectBase,
    active: Mutex<Option<ActiveTimer>>,
    timeout: Signal<()>,
}

impl Timer {
    /// Create a stopped timer.
    pub fn new() -> Self {
        Self {
            base: ObjectBase::new(),
            active: Mutex::new(None),
            timeout: Signal::new(),
        }
    }

    /// Emitted on every tick.
    pub fn timeout(&self) -> &Signal<()> {
        &self.timeout
    }

    /// Start ticking every `interval` on the calling thread's event loop.
    ///
    /// Starting an already running timer does nothing.
    pub fn start(&self, interval: Duration) -> Result<(), LoopError> {
        let timeout = self.timeout.downgrade();
        self.start_with(interval, move || {
            timeout.emit(());
        })
    }

    /// Start ticking, running `tick` instead of emitting `timeout`.
    pub fn start_with<F>(&self, interval: Duration, tick: F) -> Result<(), LoopError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut active = self.active.lock();
        if active.is_some() {
            return Ok(());
        }
        let event_loop =
            current_event_loop().ok_or_else(|| LoopError::NoEventLoop(thread::current().id()))?;
        let id = event_loop.set_repeat_timer(interval, tick)?;
        *active = Some(ActiveTimer { event_loop, id });
        Ok(())
    }

    /// Stop ticking.
    ///
    /// A tick already collected by the loop in the current pass may still run.
    pub fn stop(&self) {
        if let Some(active) = self.active.lock().take() {
            // An error only means the loop already dropped the timer.
            let _ = active.event_loop.kill_timer(active.id);
        }
    }

    /// Whether the timer is running.
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|active| active.event_loop.is_timer_active(active.id))
    }

    /// Run `f` once after `interval` on the calling thread's event loop.
    ///
    /// A zero interval runs `f` immediately.
    pub fn single_shot<F>(interval: Duration, f: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        if interval.is_zero() {
            f();
            return Ok(());
        }
        let event_loop =
            current_event_loop().ok_or_else(|| LoopError::NoEventLoop(thread::current().id()))?;
        event_loop.set_single_shot_timer(interval, f).map(|_| ())
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Object for Timer {
    fn object_base(&self) -> &ObjectBase {
        &self.base
    }

    fn signal_names(&self) -> &'static [&'static str] {
        &["timeout"]
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
