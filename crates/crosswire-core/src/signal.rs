//! Signal/slot dispatch.
//!
//! A [`Signal<Args>`] holds the handlers connected to one event shape and
//! routes every emission according to each handler's [`ConnectionType`] and
//! thread affinity. `Args` is a tuple ([`SignalArgs`]); handlers declare any
//! ordered subsequence of it as their parameters.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The broadcast point
//! - [`ConnectionId`] - Identifies one installed handler
//! - [`ConnectionType`] - How a handler is invoked (Direct, Queued, ...)
//! - [`ConnectionGuard`] - Disconnects when dropped
//! - [`WeakSignal`] - Non-owning handle that can still emit
//!
//! # Connection Types
//!
//! - **Direct**: Handler runs immediately on the emitting thread
//! - **Queued**: Handler is posted to the event loop of its thread
//! - **Auto**: Direct if the handler's thread is the emitting thread, Queued otherwise (default)
//! - **BlockingQueued**: Like Queued, but the emitter waits until the handler has run
//!
//! Connections to lifetime-tracked objects are made with
//! [`connect`](crate::connect()); this module covers bare closures, free
//! functions and untracked receivers.
//!
//! # Example
//!
//! ```
//! use crosswire_core::Signal;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI32, Ordering};
//!
//! let value_changed = Signal::<(i32,)>::new();
//! let total = Arc::new(AtomicI32::new(0));
//!
//! let sink = total.clone();
//! let id = value_changed
//!     .connect(move |value: i32| {
//!         sink.fetch_add(value, Ordering::SeqCst);
//!     })
//!     .unwrap();
//!
//! value_changed.emit((5,));
//! value_changed.disconnect(id);
//! value_changed.emit((5,));
//! assert_eq!(total.load(Ordering::SeqCst), 5);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::RwLock;
use slotmap::{SlotMap, new_key_type};

use crate::address::{Address, EntityId, SignalId};
use crate::error::{LoopError, SignalError};
use crate::invocation::{Completion, CompletionWaiter};
use crate::liveness::{LivenessObserver, LivenessToken, Observer};
use crate::logging::targets;
use crate::object::ObjectCore;
use crate::registry::event_loop_for;
use crate::slot::{FreeSlot, Projection, SignalArgs, Slot, SlotArgs};

new_key_type! {
    /// A unique identifier for an installed handler.
    ///
    /// Use this ID to disconnect a specific handler via [`Signal::disconnect`].
    pub struct ConnectionId;
}

/// Specifies how a connected handler is invoked when the signal is emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// Invoke the handler immediately on the emitting thread.
    Direct,

    /// Post the invocation to the event loop of the handler's thread.
    ///
    /// Arguments are cloned into the posted closure. If that thread has no
    /// running loop the delivery is dropped.
    Queued,

    /// Direct when emitting from the handler's thread, Queued otherwise.
    #[default]
    Auto,

    /// Like Queued, but the emitting thread waits until the handler has run.
    ///
    /// # Warning
    ///
    /// A blocking delivery to the emitting thread's own loop can never
    /// complete. It is rejected and logged instead of deadlocking, and that
    /// handler is skipped for the emission.
    BlockingQueued,
}

pub(crate) type SlotFn<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// Where a handler's deferred deliveries are routed.
pub(crate) enum Affinity {
    /// A fixed thread, captured when the handler was connected.
    Thread(ThreadId),
    /// Whatever thread the receiving object is currently affined to.
    Object(Observer<ObjectCore>),
}

impl Affinity {
    fn resolve(&self) -> Option<ThreadId> {
        match self {
            Self::Thread(thread) => Some(*thread),
            Self::Object(object) => object.with(ObjectCore::thread_id),
        }
    }
}

/// One installed handler.
pub(crate) struct Handler<Args> {
    address: Address,
    slot: SlotFn<Args>,
    connection_type: ConnectionType,
    affinity: Affinity,
    /// Liveness of the receiver, if the handler is bound to one.
    target: Option<LivenessObserver>,
}

impl<Args> Handler<Args> {
    pub(crate) fn new<F>(
        address: Address,
        slot: F,
        connection_type: ConnectionType,
        affinity: Affinity,
    ) -> Self
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        Self {
            address,
            slot: Arc::new(slot),
            connection_type,
            affinity,
            target: None,
        }
    }

    pub(crate) fn with_target(mut self, target: LivenessObserver) -> Self {
        self.target = Some(target);
        self
    }

    pub(crate) fn address(&self) -> Address {
        self.address
    }

    fn is_live(&self) -> bool {
        self.target.as_ref().is_none_or(LivenessObserver::is_alive)
    }
}

struct HandlerTable<Args> {
    handlers: SlotMap<ConnectionId, Handler<Args>>,
    addresses: HashMap<Address, ConnectionId>,
}

impl<Args> HandlerTable<Args> {
    fn new() -> Self {
        Self {
            handlers: SlotMap::with_key(),
            addresses: HashMap::new(),
        }
    }

    fn insert(&mut self, handler: Handler<Args>) -> (ConnectionId, bool) {
        let address = handler.address;
        if let Some(&existing) = self.addresses.get(&address) {
            if self.handlers.get(existing).is_some_and(Handler::is_live) {
                return (existing, false);
            }
            // The previous receiver at this address is gone; its entry is stale.
            self.handlers.remove(existing);
        }
        let id = self.handlers.insert(handler);
        self.addresses.insert(address, id);
        (id, true)
    }

    fn remove_address(&mut self, address: &Address) -> bool {
        match self.addresses.remove(address) {
            Some(id) => self.handlers.remove(id).is_some(),
            None => false,
        }
    }

    fn remove_id(&mut self, id: ConnectionId) -> Option<Address> {
        let handler = self.handlers.remove(id)?;
        self.addresses.remove(&handler.address);
        Some(handler.address)
    }

    fn clear(&mut self) {
        self.handlers.clear();
        self.addresses.clear();
    }
}

/// A handler captured for one emission, outside the table lock.
struct Delivery<Args> {
    slot: SlotFn<Args>,
    connection_type: ConnectionType,
    thread: ThreadId,
}

/// Shared state of a signal, reachable weakly by connection bookkeeping.
pub(crate) struct SignalCore<Args> {
    id: SignalId,
    table: RwLock<HandlerTable<Args>>,
    blocked: AtomicBool,
}

impl<Args: SignalArgs> SignalCore<Args> {
    fn new() -> Self {
        Self {
            id: SignalId::next(),
            table: RwLock::new(HandlerTable::new()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Install `handler` unless its address is already connected.
    ///
    /// Returns the handler's id and whether it was newly inserted.
    pub(crate) fn add_handler(&self, handler: Handler<Args>) -> (ConnectionId, bool) {
        let address = handler.address;
        let (id, inserted) = self.table.write().insert(handler);
        if inserted {
            tracing::trace!(target: targets::SIGNAL, signal = ?self.id, ?address, "handler connected");
        } else {
            tracing::trace!(target: targets::SIGNAL, signal = ?self.id, ?address, "handler already connected");
        }
        (id, inserted)
    }

    pub(crate) fn remove_handler(&self, address: &Address) -> bool {
        let removed = self.table.write().remove_address(address);
        if removed {
            tracing::trace!(target: targets::SIGNAL, signal = ?self.id, ?address, "handler disconnected");
        }
        removed
    }

    pub(crate) fn remove_connection(&self, id: ConnectionId) -> Option<Address> {
        self.table.write().remove_id(id)
    }

    pub(crate) fn address_of(&self, id: ConnectionId) -> Option<Address> {
        self.table.read().handlers.get(id).map(Handler::address)
    }

    fn emit(&self, args: Args) {
        if self.blocked.load(Ordering::SeqCst) {
            tracing::trace!(target: targets::SIGNAL, "signal blocked, skipping emit");
            return;
        }

        let deliveries: Vec<Delivery<Args>> = {
            let table = self.table.read();
            table
                .handlers
                .values()
                .filter(|handler| handler.is_live())
                .filter_map(|handler| {
                    Some(Delivery {
                        slot: handler.slot.clone(),
                        connection_type: handler.connection_type,
                        thread: handler.affinity.resolve()?,
                    })
                })
                .collect()
        };
        tracing::trace!(target: targets::SIGNAL, signal = ?self.id, handler_count = deliveries.len(), "emitting signal");

        let current_thread = thread::current().id();

        for delivery in deliveries {
            match delivery.connection_type {
                ConnectionType::Direct => (delivery.slot)(&args),
                ConnectionType::Auto if delivery.thread == current_thread => (delivery.slot)(&args),
                ConnectionType::Auto | ConnectionType::Queued => {
                    queue_delivery(delivery, args.clone());
                }
                // Later handlers wait until this one has run on its loop.
                ConnectionType::BlockingQueued => {
                    let thread = delivery.thread;
                    if let Some(waiter) = queue_blocking_delivery(delivery, args.clone())
                        && let Completion::Abandoned = waiter.wait()
                    {
                        tracing::debug!(target: targets::SIGNAL, ?thread, "target event loop shut down before blocking delivery ran");
                    }
                }
            }
        }
    }
}

fn queue_delivery<Args: SignalArgs>(delivery: Delivery<Args>, args: Args) {
    let Some(event_loop) = event_loop_for(delivery.thread) else {
        tracing::debug!(target: targets::SIGNAL, thread = ?delivery.thread, "no event loop on target thread, delivery dropped");
        return;
    };
    let slot = delivery.slot;
    if event_loop.post_event(move || slot(&args)).is_err() {
        tracing::debug!(target: targets::SIGNAL, thread = ?delivery.thread, "target event loop closed, delivery dropped");
    }
}

fn queue_blocking_delivery<Args: SignalArgs>(
    delivery: Delivery<Args>,
    args: Args,
) -> Option<CompletionWaiter> {
    let Some(event_loop) = event_loop_for(delivery.thread) else {
        tracing::debug!(target: targets::SIGNAL, thread = ?delivery.thread, "no event loop on target thread, delivery dropped");
        return None;
    };
    let slot = delivery.slot;
    match event_loop.begin_send(move || slot(&args)) {
        Ok(waiter) => Some(waiter),
        Err(LoopError::WouldDeadlock) => {
            tracing::error!(
                target: targets::SIGNAL,
                thread = ?delivery.thread,
                "blocking queued delivery to the emitting thread's own loop rejected"
            );
            None
        }
        Err(err) => {
            tracing::debug!(target: targets::SIGNAL, thread = ?delivery.thread, %err, "delivery dropped");
            None
        }
    }
}

/// A typed broadcast point with any number of connected handlers.
///
/// # Type Parameter
///
/// - `Args`: the argument tuple passed on emission. Use `()` for signals
///   without arguments and `(T,)` for a single argument.
///
/// # Thread Safety
///
/// `Signal<Args>` is `Send + Sync`. Emission snapshots the handler table
/// under a shared lock and invokes handlers with no lock held, so handlers
/// may freely connect, disconnect or emit.
pub struct Signal<Args> {
    core: LivenessToken<SignalCore<Args>>,
}

impl<Args: SignalArgs> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: SignalArgs> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            core: LivenessToken::new(SignalCore::new()),
        }
    }

    /// This signal's identity.
    pub fn id(&self) -> SignalId {
        self.core.id
    }

    /// Connect a free function or closure.
    ///
    /// Bare callables are always invoked [`Direct`](ConnectionType::Direct)
    /// and stay connected until disconnected explicitly. Connecting the same
    /// callable twice is a no-op that returns the existing id.
    ///
    /// Closure parameters must be annotated so their types can be matched
    /// against `Args`.
    pub fn connect<P, F>(&self, slot: F) -> Result<ConnectionId, SignalError>
    where
        P: SlotArgs,
        F: FreeSlot<P>,
    {
        let projection = Projection::<P>::bind::<Args>()?;
        let handler = Handler::new(
            Address::function::<F>(),
            move |args: &Args| {
                if let Some(params) = projection.apply(args) {
                    slot.invoke(params);
                }
            },
            ConnectionType::Direct,
            Affinity::Thread(thread::current().id()),
        );
        Ok(self.core.add_handler(handler).0)
    }

    /// Connect a method-like slot on a receiver that is not lifetime-tracked.
    ///
    /// The receiver is held weakly: once every `Arc` to it is gone the
    /// handler is skipped and later replaced or pruned. Deliveries are routed
    /// to the connecting thread.
    pub fn connect_method<R, P, F>(
        &self,
        receiver: &Arc<R>,
        slot: F,
        connection_type: ConnectionType,
    ) -> Result<ConnectionId, SignalError>
    where
        R: Send + Sync + 'static,
        P: SlotArgs,
        F: Slot<R, P>,
    {
        let projection = Projection::<P>::bind::<Args>()?;
        let weak = Arc::downgrade(receiver);
        let target = LivenessObserver::from(weak.clone());
        let handler = Handler::new(
            Address::slot::<F>(EntityId::of::<R>(receiver)),
            move |args: &Args| {
                let Some(receiver) = weak.upgrade() else {
                    return;
                };
                if let Some(params) = projection.apply(args) {
                    slot.invoke(&receiver, params);
                }
            },
            connection_type,
            Affinity::Thread(thread::current().id()),
        )
        .with_target(target);
        Ok(self.core.add_handler(handler).0)
    }

    /// Connect a closure that disconnects when the returned guard is dropped.
    pub fn connect_scoped<P, F>(&self, slot: F) -> Result<ConnectionGuard<Args>, SignalError>
    where
        P: SlotArgs,
        F: FreeSlot<P>,
    {
        let id = self.connect(slot)?;
        Ok(ConnectionGuard {
            signal: self.downgrade(),
            id,
        })
    }

    /// Disconnect a specific handler by its connection ID.
    ///
    /// Returns `true` if the handler was found and removed. Bookkeeping of
    /// tracked objects is left in place; use
    /// [`disconnect_connection`](crate::disconnect_connection) for those.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.core.remove_connection(id).is_some()
    }

    /// Disconnect a free function previously connected with [`connect`](Self::connect).
    pub fn disconnect_fn<F: 'static>(&self, _slot: F) -> bool {
        self.core.remove_handler(&Address::function::<F>())
    }

    /// Disconnect a slot previously connected with [`connect_method`](Self::connect_method).
    pub fn disconnect_method<R, F: 'static>(&self, receiver: &R, _slot: F) -> bool {
        self.core
            .remove_handler(&Address::slot::<F>(EntityId::of(receiver)))
    }

    /// Disconnect all handlers from this signal.
    pub fn disconnect_all(&self) {
        self.core.table.write().clear();
    }

    /// Get the number of connected handlers.
    pub fn connection_count(&self) -> usize {
        self.core.table.read().handlers.len()
    }

    /// Block signal emission temporarily.
    ///
    /// While blocked, calls to `emit()` do nothing.
    pub fn set_blocked(&self, blocked: bool) {
        self.core.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.core.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected handlers.
    ///
    /// Handlers run according to their connection type:
    ///
    /// - `Direct`: Called immediately on the current thread
    /// - `Auto`: Called directly if on the handler's thread, queued otherwise
    /// - `Queued`: Always posted to the handler's event loop
    /// - `BlockingQueued`: Posted, and this call waits until it has run
    ///
    /// `args` is cloned for each deferred delivery.
    #[tracing::instrument(skip_all, target = "crosswire_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        self.core.emit(args);
    }

    /// A non-owning handle to this signal.
    pub fn downgrade(&self) -> WeakSignal<Args> {
        WeakSignal {
            core: self.core.observe(),
        }
    }

    /// Observe whether this signal is still alive.
    pub fn liveness(&self) -> LivenessObserver {
        self.core.liveness()
    }

    pub(crate) fn core(&self) -> &SignalCore<Args> {
        &self.core
    }

    pub(crate) fn observe(&self) -> Observer<SignalCore<Args>> {
        self.core.observe()
    }
}

/// A non-owning handle to a [`Signal`].
pub struct WeakSignal<Args> {
    core: Observer<SignalCore<Args>>,
}

impl<Args: SignalArgs> WeakSignal<Args> {
    /// Emit if the signal is still alive. Returns whether it was.
    pub fn emit(&self, args: Args) -> bool {
        self.core.with(|core| core.emit(args)).is_some()
    }

    /// Disconnect a handler if the signal is still alive.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.core
            .with(|core| core.remove_connection(id).is_some())
            .unwrap_or(false)
    }

    /// Whether the signal still exists.
    pub fn is_alive(&self) -> bool {
        self.core.is_alive()
    }
}

impl<Args> Clone for WeakSignal<Args> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

/// A connection guard that disconnects its handler when dropped.
///
/// Created via [`Signal::connect_scoped`]. The guard does not keep the
/// signal alive; dropping it after the signal is gone is a no-op.
///
/// # Example
///
/// ```
/// use crosswire_core::Signal;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
///
/// let signal = Signal::<(i32,)>::new();
/// let counter = Arc::new(AtomicI32::new(0));
/// {
///     let counter_clone = counter.clone();
///     let _guard = signal
///         .connect_scoped(move |n: i32| {
///             counter_clone.fetch_add(n, Ordering::SeqCst);
///         })
///         .unwrap();
///     signal.emit((42,));
/// }
/// signal.emit((43,));
/// assert_eq!(counter.load(Ordering::SeqCst), 42);
/// ```
pub struct ConnectionGuard<Args: SignalArgs> {
    signal: WeakSignal<Args>,
    id: ConnectionId,
}

impl<Args: SignalArgs> ConnectionGuard<Args> {
    /// The guarded connection's id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args: SignalArgs> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        self.signal.disconnect(self.id);
    }
}

static_assertions::assert_impl_all!(Signal<(i32, String)>: Send, Sync);
static_assertions::assert_impl_all!(WeakSignal<()>: Send, Sync);
