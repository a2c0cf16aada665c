//! Core engine for crosswire: cross-thread signals and slots.
//!
//! This crate provides:
//!
//! - **Signals**: typed broadcast points whose handlers may accept any
//!   ordered subsequence of the signal's arguments
//! - **Connection types**: Direct, Queued, Auto and BlockingQueued delivery
//! - **Event loops**: one per thread, with FIFO queues and timers
//! - **Objects**: lifetime tracking and thread affinity, with automatic
//!   disconnection when either end of a connection goes away
//! - **Threads**: worker threads that run an event loop
//!
//! # Signal Example
//!
//! ```
//! use crosswire_core::Signal;
//!
//! let value_changed = Signal::<(i32, String)>::new();
//!
//! // A slot may take only some of the arguments.
//! let id = value_changed
//!     .connect(|value: i32| println!("value changed to {value}"))
//!     .unwrap();
//!
//! value_changed.emit((42, "answer".to_string()));
//! value_changed.disconnect(id);
//! ```
//!
//! # Cross-Thread Example
//!
//! ```
//! use crosswire_core::{connect, ConnectionType, Object, ObjectBase, Signal, ThreadObject};
//! use std::sync::Arc;
//! use std::sync::mpsc;
//!
//! struct Producer {
//!     base: ObjectBase,
//!     ready: Signal<(u64,)>,
//! }
//!
//! impl Object for Producer {
//!     fn object_base(&self) -> &ObjectBase {
//!         &self.base
//!     }
//! }
//!
//! struct Consumer {
//!     base: ThreadObject,
//!     results: mpsc::SyncSender<(u64, std::thread::ThreadId)>,
//! }
//!
//! impl Object for Consumer {
//!     fn object_base(&self) -> &ObjectBase {
//!         self.base.object_base()
//!     }
//! }
//!
//! impl Consumer {
//!     fn consume(&self, value: u64) {
//!         let _ = self.results.send((value, std::thread::current().id()));
//!     }
//! }
//!
//! let (tx, rx) = mpsc::sync_channel(1);
//! let producer = Producer { base: ObjectBase::new(), ready: Signal::new() };
//! let consumer = Arc::new(Consumer { base: ThreadObject::new().unwrap(), results: tx });
//!
//! connect(&producer, &producer.ready, &consumer, Consumer::consume, ConnectionType::Auto).unwrap();
//! producer.ready.emit((7,));
//!
//! let (value, thread) = rx.recv().unwrap();
//! assert_eq!(value, 7);
//! assert_eq!(thread, consumer.base.thread().id());
//! ```
//!
//! # Logging
//!
//! Diagnostics are emitted through [`tracing`] under the targets listed in
//! [`logging::targets`]. Install a subscriber to see them.

mod address;
mod connect;
mod error;
mod event_loop;
pub mod invocation;
mod liveness;
pub mod logging;
mod object;
pub mod registry;
mod signal;
pub mod slot;
mod thread;
mod timer;

pub use address::{Address, EntityId, MemberId, SignalId};
pub use connect::{connect, connect_with_context, disconnect, disconnect_connection};
pub use error::{Error, LoopError, Result, SignalError, ThreadError, TimerError};
pub use event_loop::{EventLoop, LoopHandle};
pub use liveness::LivenessObserver;
pub use object::{AsObjectBase, Object, ObjectBase, ObjectId};
pub use registry::{current_event_loop, event_loop_for, event_loop_registry};
pub use signal::{ConnectionGuard, ConnectionId, ConnectionType, Signal, WeakSignal};
pub use slot::{FreeSlot, SignalArgs, Slot, SlotArgs};
pub use thread::{Thread, ThreadBuilder, ThreadConfig, ThreadObject};
pub use timer::{Timer, TimerId, TimerManager};
