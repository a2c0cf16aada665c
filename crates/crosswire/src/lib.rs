//! Crosswire: cross-thread signals and slots with per-thread event loops.
//!
//! This is the umbrella crate that re-exports all public APIs, including
//! `#[derive(Object)]`.
//!
//! # Example
//!
//! ```
//! use crosswire::prelude::*;
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! #[derive(Object)]
//! #[object(crate = crosswire)]
//! struct Button {
//!     base: ObjectBase,
//!     #[signal]
//!     clicked: Signal<(u32, String)>,
//! }
//!
//! #[derive(Object)]
//! #[object(crate = crosswire)]
//! struct Label {
//!     base: ObjectBase,
//!     text: Mutex<String>,
//! }
//!
//! impl Label {
//!     fn set_text(&self, text: String) {
//!         *self.text.lock() = text;
//!     }
//! }
//!
//! let button = Button { base: ObjectBase::new(), clicked: Signal::new() };
//! let label = Arc::new(Label { base: ObjectBase::new(), text: Mutex::new(String::new()) });
//!
//! connect(&button, &button.clicked, &label, Label::set_text, ConnectionType::Auto).unwrap();
//! button.clicked.emit((1, "pressed".to_string()));
//!
//! assert_eq!(*label.text.lock(), "pressed");
//! assert_eq!(button.signal_names(), &["clicked"]);
//! ```

pub use crosswire_core::*;
pub use crosswire_macros::*;

pub mod prelude;
