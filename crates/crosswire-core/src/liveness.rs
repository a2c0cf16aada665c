//! Liveness tokens: shared ownership with weak observation.
//!
//! An entity that other parties need to reach during teardown keeps its
//! mutable state behind a [`LivenessToken`]. Counterparts hold an
//! [`Observer`], which never extends the owner's lifetime and only grants
//! access for the duration of a single call while the owner still exists.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Owning side of a liveness relationship.
///
/// Not `Clone`: exactly one owner decides when the observed state dies.
pub(crate) struct LivenessToken<T> {
    inner: Arc<T>,
}

impl<T> LivenessToken<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Create a non-owning observer of this token.
    pub(crate) fn observe(&self) -> Observer<T> {
        Observer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> LivenessToken<T> {
    /// Create a type-erased observer, suitable for public API.
    pub(crate) fn liveness(&self) -> LivenessObserver {
        LivenessObserver::from(Arc::downgrade(&self.inner))
    }
}

impl<T> Deref for LivenessToken<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

/// Typed, non-owning observer of a [`LivenessToken`].
pub(crate) struct Observer<T> {
    inner: Weak<T>,
}

impl<T> Observer<T> {
    /// Whether the owner is still alive.
    pub(crate) fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Run `f` against the observed state if the owner is still alive.
    ///
    /// The state is pinned for the duration of `f`, so a concurrent drop of
    /// the owner completes only after `f` returns.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.upgrade().map(|state| f(&state))
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// A type-erased handle answering "is the owner still alive?".
///
/// Obtained from [`ObjectBase::liveness`](crate::ObjectBase::liveness) or
/// [`Signal::liveness`](crate::Signal::liveness). Holding one never keeps
/// the owner alive.
#[derive(Clone)]
pub struct LivenessObserver {
    inner: Weak<dyn Any + Send + Sync>,
}

impl LivenessObserver {
    /// Whether the owner is still alive.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl<T: Send + Sync + 'static> From<Weak<T>> for LivenessObserver {
    fn from(weak: Weak<T>) -> Self {
        Self { inner: weak }
    }
}

impl fmt::Debug for LivenessObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LivenessObserver")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_tracks_owner() {
        let token = LivenessToken::new(5_u32);
        let observer = token.observe();
        let erased = token.liveness();

        assert!(observer.is_alive());
        assert!(erased.is_alive());
        assert_eq!(observer.with(|value| *value + 1), Some(6));

        drop(token);

        assert!(!observer.is_alive());
        assert!(!erased.is_alive());
        assert_eq!(observer.with(|value| *value), None);
    }

    #[test]
    fn test_observer_does_not_extend_lifetime() {
        let token = LivenessToken::new(String::from("owner"));
        let observers: Vec<_> = (0..4).map(|_| token.observe()).collect();
        drop(token);
        assert!(observers.iter().all(|o| !o.is_alive()));
    }

    #[test]
    fn test_erased_observer_from_arc() {
        let owner = Arc::new(Vec::<u8>::new());
        let observer = LivenessObserver::from(Arc::downgrade(&owner));
        assert!(observer.is_alive());
        drop(owner);
        assert!(!observer.is_alive());
        assert!(format!("{observer:?}").contains("alive: false"));
    }
}
