//! Endpoint identity for both ends of a connection.
//!
//! An [`Address`] pairs the identity of an entity with the identity of one of
//! its members. Signals use it to deduplicate handlers, and lifetime-tracked
//! objects use it to key their connection bookkeeping.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::object::ObjectId;

/// Identity of the entity that owns a member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    /// A lifetime-tracked object.
    Object(ObjectId),
    /// A plain shared value, identified by its address in memory.
    Instance(usize),
}

impl EntityId {
    /// Identity of a plain value by its location.
    ///
    /// Stable for as long as the value is not moved, which holds for any
    /// value behind an `Arc`.
    pub fn of<T>(value: &T) -> Self {
        Self::Instance(value as *const T as usize)
    }
}

/// Identity of a signal instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    pub(crate) fn next() -> Self {
        static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of a member: a slot callable or a signal.
///
/// Every function item and closure in Rust has its own type, so the
/// `TypeId` of the callable identifies a method or function uniquely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberId {
    /// A callable identified by its type.
    Callable(TypeId),
    /// A signal identified by its instance id.
    Signal(SignalId),
}

impl MemberId {
    /// Member identity of the callable type `F`.
    pub fn of<F: 'static>() -> Self {
        Self::Callable(TypeId::of::<F>())
    }
}

/// Identity pair `(entity, member)`.
///
/// The entity is `None` for free functions and bare closures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    entity: Option<EntityId>,
    member: MemberId,
}

impl Address {
    /// Address of a method-like slot `F` on `entity`.
    pub fn slot<F: 'static>(entity: EntityId) -> Self {
        Self {
            entity: Some(entity),
            member: MemberId::of::<F>(),
        }
    }

    /// Address of a free function or bare closure `F`.
    pub fn function<F: 'static>() -> Self {
        Self {
            entity: None,
            member: MemberId::of::<F>(),
        }
    }

    /// Address of signal `signal` owned by `entity`.
    pub fn signal(entity: EntityId, signal: SignalId) -> Self {
        Self {
            entity: Some(entity),
            member: MemberId::Signal(signal),
        }
    }

    /// The owning entity, if any.
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    /// The member component.
    pub fn member(&self) -> MemberId {
        self.member
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "Address({entity:?}, {:?})", self.member),
            None => write!(f, "Address(free, {:?})", self.member),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Receiver;

    impl Receiver {
        fn first(&self) {}
        fn second(&self) {}
    }

    fn free_function() {}

    fn type_of<F: 'static>(_: &F) -> MemberId {
        MemberId::of::<F>()
    }

    #[test]
    fn test_methods_have_distinct_identities() {
        let first = type_of(&Receiver::first);
        let second = type_of(&Receiver::second);
        assert_ne!(first, second);
        assert_eq!(first, type_of(&Receiver::first));
    }

    #[test]
    fn test_address_equality_uses_both_fields() {
        let receiver = Receiver;
        let other = Receiver;
        let entity = EntityId::of(&receiver);

        let a = Address {
            entity: Some(entity),
            member: type_of(&Receiver::first),
        };
        let b = Address {
            entity: Some(entity),
            member: type_of(&Receiver::first),
        };
        let c = Address {
            entity: Some(EntityId::of(&other)),
            member: type_of(&Receiver::first),
        };
        let d = Address {
            entity: Some(entity),
            member: type_of(&Receiver::second),
        };

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);

        let set: HashSet<_> = [a, b, c, d].into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_free_function_address_has_no_entity() {
        let address = Address {
            entity: None,
            member: type_of(&free_function),
        };
        assert_eq!(address.entity(), None);
        assert!(format!("{address:?}").starts_with("Address(free"));
    }

    #[test]
    fn test_signal_ids_are_unique() {
        let a = SignalId::next();
        let b = SignalId::next();
        assert_ne!(a, b);
        assert_ne!(MemberId::Signal(a), MemberId::Signal(b));
    }
}
