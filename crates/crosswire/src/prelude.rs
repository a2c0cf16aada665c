//! Prelude module for crosswire.
//!
//! ```ignore
//! use crosswire::prelude::*;
//! ```
//!
//! This provides access to:
//! - Signal/slot system (`Signal`, `ConnectionType`, `connect`, `disconnect`)
//! - Object system (`Object`, `ObjectBase`, `#[derive(Object)]`)
//! - Event loops, threads and timers (`EventLoop`, `Thread`, `Timer`)

// ============================================================================
// Signal/Slot System
// ============================================================================

pub use crate::{
    ConnectionGuard, ConnectionId, ConnectionType, Signal, WeakSignal, connect,
    connect_with_context, disconnect, disconnect_connection,
};

// ============================================================================
// Object System
// ============================================================================

pub use crate::{AsObjectBase, Object, ObjectBase, ObjectId, ThreadObject};

// ============================================================================
// Event Loops, Threads and Timers
// ============================================================================

pub use crate::{EventLoop, LoopHandle, Thread, ThreadBuilder, ThreadConfig, Timer, TimerId};

// ============================================================================
// Errors
// ============================================================================

pub use crate::{LoopError, SignalError, ThreadError};
