//! Connections between lifetime-tracked objects.
//!
//! A tracked connection is recorded on both ends: the receiver remembers
//! which signal feeds which of its slots, and the sender remembers which
//! slots its signal feeds. When either object goes away, its recorded
//! teardown actions remove the handler from the signal and erase the
//! matching record on the other end.
//!
//! Bounds require both endpoints to be [`Object`]s. For bare closures and
//! untracked receivers use [`Signal::connect`] and [`Signal::connect_method`].

use std::sync::Arc;

use crate::address::{Address, EntityId};
use crate::error::SignalError;
use crate::liveness::LivenessObserver;
use crate::logging::targets;
use crate::object::{ConnectionKey, Object, ObjectBase};
use crate::signal::{Affinity, ConnectionId, ConnectionType, Handler, Signal};
use crate::slot::{FreeSlot, Projection, SignalArgs, Slot, SlotArgs};

/// Connect `signal`, owned by `sender`, to a method-like `slot` on `receiver`.
///
/// The slot's parameters must be an ordered subsequence of the signal's
/// arguments. Deliveries follow the receiver's thread affinity at the time
/// of each emission. Connecting the same `(signal, receiver, slot)` again
/// returns the existing id and changes nothing.
///
/// The handler holds the receiver weakly; dropping the receiver or the
/// sender severs the connection.
pub fn connect<S, R, Args, P, F>(
    sender: &S,
    signal: &Signal<Args>,
    receiver: &Arc<R>,
    slot: F,
    connection_type: ConnectionType,
) -> Result<ConnectionId, SignalError>
where
    S: Object,
    R: Object,
    Args: SignalArgs,
    P: SlotArgs,
    F: Slot<R, P>,
{
    let projection = Projection::<P>::bind::<Args>()?;
    let weak = Arc::downgrade(receiver);
    let target = LivenessObserver::from(weak.clone());
    let base = receiver.object_base();

    let handler = Handler::new(
        Address::slot::<F>(EntityId::Object(base.id())),
        move |args: &Args| {
            let Some(receiver) = weak.upgrade() else {
                return;
            };
            if let Some(params) = projection.apply(args) {
                slot.invoke(&receiver, params);
            }
        },
        connection_type,
        Affinity::Object(base.observe()),
    )
    .with_target(target);

    Ok(bind(sender.object_base(), signal, base, handler))
}

/// Connect `signal` to a free closure whose lifetime is tied to `context`.
///
/// The closure runs in `context`'s thread and is disconnected when either
/// `context` or `sender` is dropped. Since closures cannot be named again,
/// disconnect with [`disconnect_connection`] using the returned id.
pub fn connect_with_context<S, R, Args, P, F>(
    sender: &S,
    signal: &Signal<Args>,
    context: &Arc<R>,
    slot: F,
    connection_type: ConnectionType,
) -> Result<ConnectionId, SignalError>
where
    S: Object,
    R: Object,
    Args: SignalArgs,
    P: SlotArgs,
    F: FreeSlot<P>,
{
    let projection = Projection::<P>::bind::<Args>()?;
    let target = LivenessObserver::from(Arc::downgrade(context));
    let base = context.object_base();

    let handler = Handler::new(
        Address::slot::<F>(EntityId::Object(base.id())),
        move |args: &Args| {
            if let Some(params) = projection.apply(args) {
                slot.invoke(params);
            }
        },
        connection_type,
        Affinity::Object(base.observe()),
    )
    .with_target(target);

    Ok(bind(sender.object_base(), signal, base, handler))
}

/// Disconnect `slot` on `receiver` from `signal`.
///
/// Returns whether a handler was removed. Both endpoints' records are
/// erased as well.
pub fn disconnect<S, R, Args, F>(sender: &S, signal: &Signal<Args>, receiver: &R, _slot: F) -> bool
where
    S: Object,
    R: Object,
    Args: SignalArgs,
    F: 'static,
{
    let base = receiver.object_base();
    let slot_address = Address::slot::<F>(EntityId::Object(base.id()));
    unbind(sender.object_base(), signal, base, slot_address)
}

/// Disconnect the tracked connection `id` from `signal`.
///
/// Does nothing unless `id` is a connection from `signal` to `receiver`.
pub fn disconnect_connection<S, R, Args>(
    sender: &S,
    signal: &Signal<Args>,
    receiver: &R,
    id: ConnectionId,
) -> bool
where
    S: Object,
    R: Object,
    Args: SignalArgs,
{
    let base = receiver.object_base();
    match signal.core().address_of(id) {
        Some(address) if address.entity() == Some(EntityId::Object(base.id())) => {
            unbind(sender.object_base(), signal, base, address)
        }
        _ => false,
    }
}

fn signal_address<Args: SignalArgs>(sender: &ObjectBase, signal: &Signal<Args>) -> Address {
    Address::signal(EntityId::Object(sender.id()), signal.id())
}

fn bind<Args: SignalArgs>(
    sender: &ObjectBase,
    signal: &Signal<Args>,
    receiver: &ObjectBase,
    handler: Handler<Args>,
) -> ConnectionId {
    let slot_address = handler.address();
    let (id, inserted) = signal.core().add_handler(handler);
    if !inserted {
        return id;
    }

    let signal_address = signal_address(sender, signal);
    let key = ConnectionKey {
        signal: signal_address,
        slot: slot_address,
    };
    let member = slot_address.member();

    // Runs when the receiver tears down.
    let signal_observer = signal.observe();
    let sender_observer = sender.observe();
    receiver.core().add_sender(
        signal_address,
        member,
        Arc::new(move || {
            signal_observer.with(|signal| signal.remove_handler(&slot_address));
            sender_observer.with(|sender| sender.remove_receiver(&key));
        }),
    );

    // Runs when the sender tears down.
    let signal_observer = signal.observe();
    let receiver_observer = receiver.observe();
    sender.core().add_receiver(
        key,
        Arc::new(move || {
            signal_observer.with(|signal| signal.remove_handler(&slot_address));
            receiver_observer.with(|receiver| receiver.remove_sender(&signal_address, member));
        }),
    );

    tracing::debug!(
        target: targets::CONNECT,
        sender = %sender.id(),
        receiver = %receiver.id(),
        ?slot_address,
        "objects connected"
    );
    id
}

fn unbind<Args: SignalArgs>(
    sender: &ObjectBase,
    signal: &Signal<Args>,
    receiver: &ObjectBase,
    slot_address: Address,
) -> bool {
    let removed = signal.core().remove_handler(&slot_address);

    let signal_address = signal_address(sender, signal);
    let key = ConnectionKey {
        signal: signal_address,
        slot: slot_address,
    };
    let member = slot_address.member();
    if sender.core().has_receiver(&key) && receiver.core().has_sender(&signal_address, member) {
        sender.core().remove_receiver(&key);
        receiver.core().remove_sender(&signal_address, member);
        tracing::debug!(
            target: targets::CONNECT,
            sender = %sender.id(),
            receiver = %receiver.id(),
            ?slot_address,
            "objects disconnected"
        );
    }
    removed
}
