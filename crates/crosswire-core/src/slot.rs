//! Argument lists, slot adapters and structural argument matching.
//!
//! A signal broadcasts a tuple of arguments ([`SignalArgs`]). A slot declares
//! its own parameter tuple ([`SlotArgs`]), which must be an order-preserving
//! subsequence of the signal's. The match is computed once, when the slot is
//! bound, by [`match_signature`]; the resulting [`Projection`] extracts the
//! selected positions on every emission.
//!
//! ```
//! use crosswire_core::Signal;
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! let signal = Signal::<(i32, char, String)>::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = seen.clone();
//! signal
//!     .connect(move |c: char| sink.lock().push(c))
//!     .expect("char is one of the signal's parameters");
//!
//! signal.emit((42, 'x', "hi".to_string()));
//! assert_eq!(*seen.lock(), vec!['x']);
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;

use crate::error::SignalError;

/// Runtime descriptor of one parameter type.
#[derive(Clone, Copy)]
pub struct ArgType {
    id: TypeId,
    name: &'static str,
}

impl ArgType {
    /// Descriptor for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The type's name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ArgType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ArgType {}

impl fmt::Debug for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The full argument list a signal broadcasts.
///
/// Implemented for `()` and tuples of up to eight `Clone + Send + 'static`
/// elements. Arguments are cloned for every deferred delivery.
pub trait SignalArgs: Clone + Send + 'static {
    /// Parameter types in declaration order.
    fn signature() -> Vec<ArgType>;

    /// Borrow the argument at `index` as `Any`.
    fn arg(&self, index: usize) -> Option<&dyn Any>;
}

/// The parameter list a slot declares.
///
/// Implemented for `()` and tuples of up to eight `Clone + 'static` elements.
pub trait SlotArgs: Sized + 'static {
    /// Parameter types in declaration order.
    fn signature() -> Vec<ArgType>;

    /// Build the slot's arguments from the selected signal positions.
    fn project<Src: SignalArgs>(args: &Src, indices: &[usize]) -> Option<Self>;
}

fn fetch<T: Clone + 'static, Src: SignalArgs>(args: &Src, index: Option<&usize>) -> Option<T> {
    args.arg(*index?)?.downcast_ref::<T>().cloned()
}

macro_rules! impl_args {
    ($($T:ident $idx:tt),*) => {
        impl<$($T: Clone + Send + 'static),*> SignalArgs for ($($T,)*) {
            fn signature() -> Vec<ArgType> {
                vec![$(ArgType::of::<$T>()),*]
            }

            #[allow(unused_variables)]
            fn arg(&self, index: usize) -> Option<&dyn Any> {
                match index {
                    $($idx => Some(&self.$idx as &dyn Any),)*
                    _ => None,
                }
            }
        }

        impl<$($T: Clone + 'static),*> SlotArgs for ($($T,)*) {
            fn signature() -> Vec<ArgType> {
                vec![$(ArgType::of::<$T>()),*]
            }

            #[allow(unused_variables, unused_mut)]
            fn project<Src: SignalArgs>(args: &Src, indices: &[usize]) -> Option<Self> {
                let mut indices = indices.iter();
                Some(($(fetch::<$T, Src>(args, indices.next())?,)*))
            }
        }
    };
}

impl_args!();
impl_args!(A 0);
impl_args!(A 0, B 1);
impl_args!(A 0, B 1, C 2);
impl_args!(A 0, B 1, C 2, D 3);
impl_args!(A 0, B 1, C 2, D 3, E 4);
impl_args!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_args!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_args!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Match a slot's parameters against a signal's parameters.
///
/// Scans left to right; each slot parameter consumes the first unused
/// signal position of the same type after the previous match. Returns the
/// selected signal positions, or the first slot parameter left unmatched.
pub fn match_signature(slot: &[ArgType], signal: &[ArgType]) -> Result<Vec<usize>, SignalError> {
    let mut indices = Vec::with_capacity(slot.len());
    let mut next = 0;

    for param in slot {
        let found = signal
            .iter()
            .enumerate()
            .skip(next)
            .find(|(_, candidate)| *candidate == param)
            .map(|(index, _)| index);

        match found {
            Some(index) => {
                indices.push(index);
                next = index + 1;
            }
            None => {
                return Err(SignalError::SignatureMismatch {
                    slot: join_names(slot),
                    signal: join_names(signal),
                    missing: param.name(),
                });
            }
        }
    }

    Ok(indices)
}

fn join_names(types: &[ArgType]) -> String {
    types
        .iter()
        .map(ArgType::name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A bound selection of signal positions feeding a slot's parameters.
pub(crate) struct Projection<P> {
    indices: Vec<usize>,
    _params: PhantomData<fn() -> P>,
}

impl<P: SlotArgs> Projection<P> {
    /// Bind slot parameters `P` to signal arguments `A`.
    pub(crate) fn bind<A: SignalArgs>() -> Result<Self, SignalError> {
        let indices = match_signature(&P::signature(), &A::signature())?;
        Ok(Self {
            indices,
            _params: PhantomData,
        })
    }

    pub(crate) fn apply<A: SignalArgs>(&self, args: &A) -> Option<P> {
        P::project(args, &self.indices)
    }
}

/// A callable invoked on a receiver with parameters `P`.
///
/// Implemented for every `Fn(&R, P1, .., Pk)`, which covers methods
/// (`Button::on_click`) and closures taking the receiver first.
pub trait Slot<R, P>: Send + Sync + 'static {
    /// Invoke the slot.
    fn invoke(&self, receiver: &R, args: P);
}

/// A callable with no receiver: a free function or closure.
pub trait FreeSlot<P>: Send + Sync + 'static {
    /// Invoke the slot.
    fn invoke(&self, args: P);
}

macro_rules! impl_slot {
    ($($T:ident),*) => {
        impl<Func, Recv, $($T),*> Slot<Recv, ($($T,)*)> for Func
        where
            Func: Fn(&Recv, $($T),*) + Send + Sync + 'static,
        {
            #[allow(non_snake_case)]
            fn invoke(&self, receiver: &Recv, ($($T,)*): ($($T,)*)) {
                self(receiver, $($T),*)
            }
        }

        impl<Func, $($T),*> FreeSlot<($($T,)*)> for Func
        where
            Func: Fn($($T),*) + Send + Sync + 'static,
        {
            #[allow(non_snake_case)]
            fn invoke(&self, ($($T,)*): ($($T,)*)) {
                self($($T),*)
            }
        }
    };
}

impl_slot!();
impl_slot!(A);
impl_slot!(A, B);
impl_slot!(A, B, C);
impl_slot!(A, B, C, D);
impl_slot!(A, B, C, D, E);
impl_slot!(A, B, C, D, E, F);
impl_slot!(A, B, C, D, E, F, G);
impl_slot!(A, B, C, D, E, F, G, H);
