//! Integration tests for the #[derive(Object)] macro.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crosswire_core::{ConnectionType, Object, ObjectBase, Signal, ThreadObject, connect};
use crosswire_macros::Object;
use parking_lot::Mutex;

// Base found by field name
#[derive(Object)]
struct TestButton {
    base: ObjectBase,

    #[signal]
    clicked: Signal<()>,

    #[signal]
    text_changed: Signal<(String,)>,

    label: String,
}

impl TestButton {
    fn new() -> Self {
        Self {
            base: ObjectBase::new(),
            clicked: Signal::new(),
            text_changed: Signal::new(),
            label: "ok".to_string(),
        }
    }
}

// Base marked explicitly, owning a worker thread
#[derive(Object)]
struct TestWorker {
    #[object(base)]
    inner: ThreadObject,

    received: Mutex<Vec<String>>,
}

impl TestWorker {
    fn on_text(&self, text: String) {
        self.received.lock().push(text);
    }
}

// No signals
#[derive(Object)]
struct Plain {
    base: ObjectBase,
}

// Generic
#[derive(Object)]
struct Holder<T: Send + Sync + 'static> {
    base: ObjectBase,
    value: T,

    #[signal]
    changed: Signal<(u32,)>,
}

#[derive(Object)]
struct Tally {
    base: ObjectBase,
    total: AtomicU32,
}

impl Tally {
    fn on_changed(&self, n: u32) {
        self.total.fetch_add(n, Ordering::SeqCst);
    }
}

// ============= Tests =============

#[test]
fn test_derive_generates_object_impl() {
    let button = TestButton::new();

    assert_eq!(button.object_id(), button.base.id());
    assert_eq!(button.thread_id(), std::thread::current().id());
    assert_eq!(button.label, "ok");
}

#[test]
fn test_signal_names_in_declaration_order() {
    let button = TestButton::new();
    assert_eq!(button.signal_names(), &["clicked", "text_changed"]);

    let plain = Plain {
        base: ObjectBase::new(),
    };
    assert!(plain.signal_names().is_empty());
}

#[test]
fn test_marked_base_field_is_used() {
    let worker = TestWorker {
        inner: ThreadObject::new().unwrap(),
        received: Mutex::new(Vec::new()),
    };

    assert_eq!(worker.object_id(), worker.inner.object_id());
    assert_eq!(worker.thread_id(), worker.inner.thread().id());
    assert_ne!(worker.thread_id(), std::thread::current().id());
    assert!(worker.event_loop().is_some());
}

#[test]
fn test_generic_struct() {
    let holder = Holder {
        base: ObjectBase::new(),
        value: vec![1u8, 2, 3],
        changed: Signal::new(),
    };
    let tally = Arc::new(Tally {
        base: ObjectBase::new(),
        total: AtomicU32::new(0),
    });

    connect(&holder, &holder.changed, &tally, Tally::on_changed, ConnectionType::Direct).unwrap();
    holder.changed.emit((holder.value.len() as u32,));

    assert_eq!(holder.signal_names(), &["changed"]);
    assert_eq!(tally.total.load(Ordering::SeqCst), 3);
}

#[test]
fn test_derived_objects_connect_across_threads() {
    let button = TestButton::new();
    let worker = Arc::new(TestWorker {
        inner: ThreadObject::new().unwrap(),
        received: Mutex::new(Vec::new()),
    });

    connect(
        &button,
        &button.text_changed,
        &worker,
        TestWorker::on_text,
        ConnectionType::BlockingQueued,
    )
    .unwrap();
    button.text_changed.emit(("hello".to_string(),));

    assert_eq!(*worker.received.lock(), vec!["hello".to_string()]);
    assert_eq!(button.object_base().receiver_count(), 1);

    drop(worker);
    assert_eq!(button.text_changed.connection_count(), 0);
    assert!(!button.object_base().has_connections());
}

#[test]
fn test_unused_signal_is_untouched() {
    let button = TestButton::new();
    button.clicked.emit(());
    assert_eq!(button.clicked.connection_count(), 0);
}
