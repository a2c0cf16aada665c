//! Lifetime-tracked objects with thread affinity.
//!
//! An object embeds an [`ObjectBase`], which gives it:
//! - A unique [`ObjectId`]
//! - Thread affinity: the thread whose event loop receives its deferred slots
//! - Connection bookkeeping, so that when either end of a connection dies
//!   the other end is cleaned up automatically
//!
//! # Key Types
//!
//! - [`Object`] - Trait all tracked objects implement
//! - [`ObjectBase`] - Embedded state backing [`Object`]
//! - [`ObjectId`] - Unique identifier for each object
//!
//! # Example
//!
//! ```
//! use crosswire_core::{Object, ObjectBase, Signal, ConnectionType, connect};
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! struct Button {
//!     base: ObjectBase,
//!     clicked: Signal<(u32,)>,
//! }
//!
//! impl Object for Button {
//!     fn object_base(&self) -> &ObjectBase {
//!         &self.base
//!     }
//! }
//!
//! struct Label {
//!     base: ObjectBase,
//!     text: Mutex<String>,
//! }
//!
//! impl Object for Label {
//!     fn object_base(&self) -> &ObjectBase {
//!         &self.base
//!     }
//! }
//!
//! impl Label {
//!     fn show_count(&self, clicks: u32) {
//!         *self.text.lock() = format!("clicked {clicks} times");
//!     }
//! }
//!
//! let button = Button { base: ObjectBase::new(), clicked: Signal::new() };
//! let label = Arc::new(Label { base: ObjectBase::new(), text: Mutex::new(String::new()) });
//!
//! connect(&button, &button.clicked, &label, Label::show_count, ConnectionType::Auto).unwrap();
//! button.clicked.emit((3,));
//! assert_eq!(*label.text.lock(), "clicked 3 times");
//!
//! // Dropping the receiver removes the handler from the signal.
//! drop(label);
//! assert_eq!(button.clicked.connection_count(), 0);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};

use crate::address::{Address, MemberId};
use crate::error::LoopError;
use crate::event_loop::LoopHandle;
use crate::liveness::{LivenessObserver, LivenessToken, Observer};
use crate::logging::targets;
use crate::registry::event_loop_for;
use crate::signal::ConnectionType;

/// A unique identifier for an object.
///
/// Ids are allocated from a process-wide counter and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Teardown action for one side of a connection.
pub(crate) type Cleanup = Arc<dyn Fn() + Send + Sync>;

/// Sender-side key of one connection: which signal feeds which slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ConnectionKey {
    pub(crate) signal: Address,
    pub(crate) slot: Address,
}

/// The shared state behind an [`ObjectBase`].
pub(crate) struct ObjectCore {
    id: ObjectId,
    thread: Mutex<ThreadId>,
    /// Signals feeding this object's slots: signal address, then slot member.
    senders: RwLock<HashMap<Address, HashMap<MemberId, Cleanup>>>,
    /// Slots fed by this object's signals.
    receivers: RwLock<HashMap<ConnectionKey, Cleanup>>,
}

impl ObjectCore {
    fn new() -> Self {
        Self {
            id: ObjectId::next(),
            thread: Mutex::new(thread::current().id()),
            senders: RwLock::new(HashMap::new()),
            receivers: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn id(&self) -> ObjectId {
        self.id
    }

    pub(crate) fn thread_id(&self) -> ThreadId {
        *self.thread.lock()
    }

    pub(crate) fn add_sender(&self, signal: Address, member: MemberId, cleanup: Cleanup) {
        self.senders
            .write()
            .entry(signal)
            .or_default()
            .insert(member, cleanup);
    }

    pub(crate) fn has_sender(&self, signal: &Address, member: MemberId) -> bool {
        self.senders
            .read()
            .get(signal)
            .is_some_and(|members| members.contains_key(&member))
    }

    pub(crate) fn remove_sender(&self, signal: &Address, member: MemberId) -> bool {
        let mut senders = self.senders.write();
        let Some(members) = senders.get_mut(signal) else {
            return false;
        };
        let removed = members.remove(&member).is_some();
        if members.is_empty() {
            senders.remove(signal);
        }
        removed
    }

    pub(crate) fn add_receiver(&self, key: ConnectionKey, cleanup: Cleanup) {
        self.receivers.write().insert(key, cleanup);
    }

    pub(crate) fn has_receiver(&self, key: &ConnectionKey) -> bool {
        self.receivers.read().contains_key(key)
    }

    pub(crate) fn remove_receiver(&self, key: &ConnectionKey) -> bool {
        self.receivers.write().remove(key).is_some()
    }

    /// Empty both registries, returning their teardown actions.
    fn take_all(&self) -> Vec<Cleanup> {
        let senders = std::mem::take(&mut *self.senders.write());
        let receivers = std::mem::take(&mut *self.receivers.write());
        senders
            .into_values()
            .flat_map(HashMap::into_values)
            .chain(receivers.into_values())
            .collect()
    }
}

/// Embedded state for implementing [`Object`].
///
/// Include this as a field in your object types. The object starts out
/// affined to the thread that created it. Dropping the base severs every
/// connection the object takes part in.
pub struct ObjectBase {
    core: LivenessToken<ObjectCore>,
}

impl ObjectBase {
    /// Create a new base affined to the calling thread.
    pub fn new() -> Self {
        let core = LivenessToken::new(ObjectCore::new());
        tracing::trace!(target: targets::OBJECT, id = %core.id(), "object created");
        Self { core }
    }

    /// Get the object's ID.
    pub fn id(&self) -> ObjectId {
        self.core.id()
    }

    /// The thread whose event loop receives this object's deferred slots.
    pub fn thread_id(&self) -> ThreadId {
        self.core.thread_id()
    }

    /// Change the object's thread affinity.
    ///
    /// Applies to every delivery routed after the call, including those of
    /// connections made earlier.
    pub fn move_to_thread(&self, thread: ThreadId) {
        let previous = std::mem::replace(&mut *self.core.thread.lock(), thread);
        tracing::debug!(target: targets::OBJECT, id = %self.id(), from = ?previous, to = ?thread, "object moved to thread");
    }

    /// The event loop of the object's thread, if one is running.
    pub fn event_loop(&self) -> Option<LoopHandle> {
        event_loop_for(self.thread_id())
    }

    /// Run `f` in the object's thread context.
    ///
    /// Follows the same rules as signal delivery: `Direct` runs `f` inline,
    /// `Auto` runs inline only on the object's thread, `Queued` posts and
    /// `BlockingQueued` posts and waits.
    pub fn invoke_method<F>(&self, f: F, connection_type: ConnectionType) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        let thread = self.thread_id();
        match connection_type {
            ConnectionType::Direct => {
                f();
                Ok(())
            }
            ConnectionType::Auto if thread == thread::current().id() => {
                f();
                Ok(())
            }
            ConnectionType::Auto | ConnectionType::Queued => event_loop_for(thread)
                .ok_or(LoopError::NoEventLoop(thread))?
                .post_event(f),
            ConnectionType::BlockingQueued => event_loop_for(thread)
                .ok_or(LoopError::NoEventLoop(thread))?
                .send_event(f),
        }
    }

    /// Sever every connection this object takes part in, as sender or receiver.
    ///
    /// Idempotent. Teardown actions run with no registry lock held.
    pub fn disconnect_all(&self) {
        let cleanups = self.core.take_all();
        if cleanups.is_empty() {
            return;
        }
        tracing::trace!(target: targets::OBJECT, id = %self.id(), count = cleanups.len(), "disconnecting all");
        for cleanup in cleanups {
            cleanup();
        }
    }

    /// Number of connections feeding this object's slots.
    pub fn sender_count(&self) -> usize {
        self.core.senders.read().values().map(HashMap::len).sum()
    }

    /// Number of connections fed by this object's signals.
    pub fn receiver_count(&self) -> usize {
        self.core.receivers.read().len()
    }

    /// Whether the object takes part in any connection.
    pub fn has_connections(&self) -> bool {
        self.sender_count() > 0 || self.receiver_count() > 0
    }

    /// Observe whether this object is still alive.
    pub fn liveness(&self) -> LivenessObserver {
        self.core.liveness()
    }

    pub(crate) fn core(&self) -> &ObjectCore {
        &self.core
    }

    pub(crate) fn observe(&self) -> Observer<ObjectCore> {
        self.core.observe()
    }
}

impl Default for ObjectBase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBase")
            .field("id", &self.id())
            .field("thread", &self.thread_id())
            .finish_non_exhaustive()
    }
}

impl Drop for ObjectBase {
    fn drop(&mut self) {
        self.disconnect_all();
        tracing::trace!(target: targets::OBJECT, id = %self.id(), "object destroyed");
    }
}

/// Types that embed an [`ObjectBase`], directly or through a wrapper.
///
/// Used by `#[derive(Object)]` to locate the base field.
pub trait AsObjectBase {
    /// The embedded base.
    fn as_object_base(&self) -> &ObjectBase;
}

impl AsObjectBase for ObjectBase {
    fn as_object_base(&self) -> &ObjectBase {
        self
    }
}

/// Trait for lifetime-tracked objects.
///
/// Only [`object_base`](Self::object_base) is required; everything else
/// forwards to it. Use `#[derive(Object)]` to generate the impl.
pub trait Object: Send + Sync + 'static {
    /// The embedded base.
    fn object_base(&self) -> &ObjectBase;

    /// Names of the signals this type declares.
    fn signal_names(&self) -> &'static [&'static str] {
        &[]
    }

    /// Get this object's unique identifier.
    fn object_id(&self) -> ObjectId {
        self.object_base().id()
    }

    /// The thread this object is affined to.
    fn thread_id(&self) -> ThreadId {
        self.object_base().thread_id()
    }

    /// Change this object's thread affinity.
    fn move_to_thread(&self, thread: ThreadId) {
        self.object_base().move_to_thread(thread);
    }

    /// The event loop of this object's thread, if one is running.
    fn event_loop(&self) -> Option<LoopHandle> {
        self.object_base().event_loop()
    }

    /// Sever every connection this object takes part in.
    fn disconnect_all(&self) {
        self.object_base().disconnect_all();
    }

    /// Run `f` in this object's thread context. See [`ObjectBase::invoke_method`].
    fn invoke_method<F>(&self, f: F, connection_type: ConnectionType) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
        Self: Sized,
    {
        self.object_base().invoke_method(f, connection_type)
    }

    /// Sever all connections now and release this reference on the object's
    /// own thread.
    ///
    /// The release is posted to the object's event loop, so slots already
    /// queued there run first. Without a running loop the reference is
    /// released immediately.
    fn delete_later(self: Arc<Self>)
    where
        Self: Sized,
    {
        self.disconnect_all();
        let thread = self.thread_id();
        match event_loop_for(thread) {
            Some(event_loop) => {
                // On failure the closure, and with it `self`, is dropped here.
                if event_loop.post_event(move || drop(self)).is_err() {
                    tracing::debug!(target: targets::OBJECT, ?thread, "event loop closed, released immediately");
                }
            }
            None => drop(self),
        }
    }
}

static_assertions::assert_impl_all!(ObjectBase: Send, Sync);
