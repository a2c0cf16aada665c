//! Worker threads that run an event loop.
//!
//! [`Thread`] spawns an OS thread, creates an [`EventLoop`] on it and runs
//! the loop until asked to quit. Objects moved to that thread receive their
//! queued slots there.
//!
//! # Example
//!
//! ```
//! use crosswire_core::{ObjectBase, Thread};
//! use std::sync::mpsc;
//!
//! let thread = Thread::new().unwrap();
//! let worker = ObjectBase::new();
//! worker.move_to_thread(thread.id());
//!
//! let (tx, rx) = mpsc::channel();
//! thread
//!     .event_loop()
//!     .unwrap()
//!     .post_event(move || tx.send(std::thread::current().id()).unwrap())
//!     .unwrap();
//! assert_eq!(rx.recv().unwrap(), thread.id());
//!
//! thread.quit();
//! assert!(thread.join());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;

use crate::error::ThreadError;
use crate::event_loop::{EventLoop, LoopHandle};
use crate::logging::targets;
use crate::object::{AsObjectBase, Object, ObjectBase};
use crate::registry::{event_loop_for, event_loop_registry};

/// Configuration for spawning a [`Thread`].
#[derive(Debug, Clone)]
pub struct ThreadConfig {
    /// Name for the OS thread.
    pub name: String,
    /// Stack size for the thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            name: "crosswire-loop".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadConfig {
    /// Create a new configuration with the given thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Builder for spawning threads with custom configuration.
#[derive(Debug, Default)]
pub struct ThreadBuilder {
    config: ThreadConfig,
}

impl ThreadBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the stack size for the thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Spawn the thread and wait until its loop is running.
    pub fn spawn(self) -> Result<Thread, ThreadError> {
        Thread::with_config(self.config)
    }

    /// Spawn the thread, running `init` as the loop's first event.
    pub fn spawn_with<F>(self, init: F) -> Result<Thread, ThreadError>
    where
        F: FnOnce() + Send + 'static,
    {
        Thread::spawn_with_config(self.config, init)
    }
}

/// An OS thread running an [`EventLoop`].
///
/// Construction returns once the loop is registered, so objects can be
/// moved to the thread and addressed immediately. Dropping a `Thread`
/// detaches it; call [`quit`](Self::quit) and [`join`](Self::join) to shut
/// it down.
pub struct Thread {
    id: ThreadId,
    name: String,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Thread {
    /// Spawn a thread with default configuration.
    pub fn new() -> Result<Self, ThreadError> {
        Self::with_config(ThreadConfig::default())
    }

    /// Spawn a thread with custom configuration.
    pub fn with_config(config: ThreadConfig) -> Result<Self, ThreadError> {
        Self::spawn_with_config(config, || {})
    }

    /// Spawn a thread that runs `init` as its loop's first event.
    pub fn spawn<F>(init: F) -> Result<Self, ThreadError>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::spawn_with_config(ThreadConfig::default(), init)
    }

    /// Spawn a configured thread that runs `init` as its loop's first event.
    pub fn spawn_with_config<F>(config: ThreadConfig, init: F) -> Result<Self, ThreadError>
    where
        F: FnOnce() + Send + 'static,
    {
        let started = Arc::new(AtomicBool::new(false));
        let thread_started = started.clone();

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let handle = builder.spawn(move || {
            let event_loop = match EventLoop::new() {
                Ok(event_loop) => event_loop,
                Err(err) => {
                    tracing::error!(target: targets::THREAD, %err, "failed to create event loop");
                    return;
                }
            };
            thread_started.store(true, Ordering::Release);
            if event_loop.post_event(init).is_ok() {
                event_loop.run();
            }
        })?;

        let id = handle.thread().id();
        // Wait for the loop to show up in the registry.
        while !event_loop_registry().contains(id) {
            if handle.is_finished() {
                if started.load(Ordering::Acquire) {
                    break;
                }
                return Err(ThreadError::LoopStartFailed);
            }
            thread::yield_now();
        }

        tracing::debug!(target: targets::THREAD, ?id, name = %config.name, "thread started");
        Ok(Self {
            id,
            name: config.name,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// The thread's id.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The thread's event loop, while it is running.
    pub fn event_loop(&self) -> Option<LoopHandle> {
        event_loop_for(self.id)
    }

    /// Whether the thread's event loop is still registered.
    pub fn is_running(&self) -> bool {
        event_loop_registry().contains(self.id)
    }

    /// Ask the event loop to exit.
    ///
    /// Closures queued before this call still run. Non-blocking.
    pub fn quit(&self) {
        if let Some(event_loop) = self.event_loop() {
            event_loop.quit();
        }
    }

    /// Wait for the thread to finish.
    ///
    /// Returns `true` if the thread was joined successfully, `false` if
    /// already joined or the thread panicked.
    pub fn join(&self) -> bool {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => handle.join().is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// An object that owns the thread it is affined to.
///
/// Embed it in place of an [`ObjectBase`] to get an object whose slots run
/// on a dedicated thread. Dropping it quits that thread's loop and, unless
/// dropped on that very thread, waits for the thread to exit.
pub struct ThreadObject {
    base: ObjectBase,
    thread: Thread,
}

impl ThreadObject {
    /// Spawn a dedicated thread with default configuration.
    pub fn new() -> Result<Self, ThreadError> {
        Self::with_config(ThreadConfig::default())
    }

    /// Spawn a dedicated thread with custom configuration.
    pub fn with_config(config: ThreadConfig) -> Result<Self, ThreadError> {
        let thread = Thread::with_config(config)?;
        let base = ObjectBase::new();
        base.move_to_thread(thread.id());
        Ok(Self { base, thread })
    }

    /// The owned thread.
    pub fn thread(&self) -> &Thread {
        &self.thread
    }
}

impl AsObjectBase for ThreadObject {
    fn as_object_base(&self) -> &ObjectBase {
        &self.base
    }
}

impl Object for ThreadObject {
    fn object_base(&self) -> &ObjectBase {
        &self.base
    }
}

impl Drop for ThreadObject {
    fn drop(&mut self) {
        self.base.disconnect_all();
        self.thread.quit();
        if thread::current().id() != self.thread.id() {
            self.thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_thread_runs_init_on_its_loop() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let thread = Thread::spawn(move || {
            tx.send(thread::current().id()).unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv().unwrap(), thread.id());
        assert!(thread.is_running());
        thread.quit();
        assert!(thread.join());
        assert!(!thread.is_running());
        assert!(!thread.join());
    }

    #[test]
    fn test_builder_names_thread() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let thread = ThreadBuilder::new()
            .name("named-loop")
            .stack_size(256 * 1024)
            .spawn_with(move || {
                tx.send(thread::current().name().map(str::to_string)).unwrap();
            })
            .unwrap();

        assert_eq!(thread.name(), "named-loop");
        assert_eq!(rx.recv().unwrap().as_deref(), Some("named-loop"));
        thread.quit();
        thread.join();
    }

    #[test]
    fn test_loop_is_registered_when_constructor_returns() {
        let thread = Thread::new().unwrap();
        assert!(thread.event_loop().is_some());

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        thread
            .event_loop()
            .unwrap()
            .send_event(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        thread.quit();
        thread.join();
    }

    #[test]
    fn test_thread_object_owns_its_thread() {
        let object = ThreadObject::new().unwrap();
        let thread_id = object.thread().id();
        assert_eq!(object.as_object_base().thread_id(), thread_id);
        assert!(event_loop_registry().contains(thread_id));

        drop(object);
        assert!(!event_loop_registry().contains(thread_id));
    }
}
