//! Process-wide registry mapping threads to their event loops.
//!
//! Lifecycle: the registry is created lazily by the first [`EventLoop`] and
//! holds one entry per live loop. An entry is inserted when a loop is
//! constructed and removed when it is dropped, so the registry is empty
//! again once the last loop is gone. All access goes through
//! [`event_loop_registry`].
//!
//! [`EventLoop`]: crate::EventLoop

use std::collections::HashMap;
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

use parking_lot::RwLock;

use crate::error::LoopError;
use crate::event_loop::LoopHandle;

static EVENT_LOOP_REGISTRY: OnceLock<EventLoopRegistry> = OnceLock::new();

/// Registry of running event loops keyed by thread.
pub struct EventLoopRegistry {
    loops: RwLock<HashMap<ThreadId, LoopHandle>>,
}

impl EventLoopRegistry {
    fn new() -> Self {
        Self {
            loops: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn register(&self, handle: LoopHandle) -> Result<(), LoopError> {
        let thread = handle.thread_id();
        let mut loops = self.loops.write();
        if loops.contains_key(&thread) {
            return Err(LoopError::AlreadyRunning(thread));
        }
        loops.insert(thread, handle);
        Ok(())
    }

    /// Remove `handle` if it is still the loop registered for its thread.
    pub(crate) fn deregister(&self, handle: &LoopHandle) {
        let mut loops = self.loops.write();
        let thread = handle.thread_id();
        if loops.get(&thread).is_some_and(|current| current.same_loop(handle)) {
            loops.remove(&thread);
        }
    }

    /// The loop running on `thread`, if any.
    pub fn get(&self, thread: ThreadId) -> Option<LoopHandle> {
        self.loops.read().get(&thread).cloned()
    }

    /// Whether a loop is registered for `thread`.
    pub fn contains(&self, thread: ThreadId) -> bool {
        self.loops.read().contains_key(&thread)
    }

    /// Number of registered loops.
    pub fn len(&self) -> usize {
        self.loops.read().len()
    }

    /// Whether no loops are registered.
    pub fn is_empty(&self) -> bool {
        self.loops.read().is_empty()
    }
}

/// Get the global event loop registry.
pub fn event_loop_registry() -> &'static EventLoopRegistry {
    EVENT_LOOP_REGISTRY.get_or_init(EventLoopRegistry::new)
}

/// The event loop running on `thread`, if any.
pub fn event_loop_for(thread: ThreadId) -> Option<LoopHandle> {
    event_loop_registry().get(thread)
}

/// The event loop running on the calling thread, if any.
pub fn current_event_loop() -> Option<LoopHandle> {
    event_loop_for(thread::current().id())
}
