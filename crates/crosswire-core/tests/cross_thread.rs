//! Cross-thread delivery: queued, blocking and auto connections between
//! objects living on different event loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use crosswire_core::{
    ConnectionType, Object, ObjectBase, Signal, Thread, ThreadObject, Timer, connect,
};
use parking_lot::Mutex;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Route engine diagnostics to the test harness output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

struct Emitter {
    base: ObjectBase,
    sig: Signal<(i32, char, String)>,
}

impl Emitter {
    fn new() -> Self {
        Self {
            base: ObjectBase::new(),
            sig: Signal::new(),
        }
    }
}

impl Object for Emitter {
    fn object_base(&self) -> &ObjectBase {
        &self.base
    }
}

/// A receiver living on its own worker thread.
struct Worker {
    base: ThreadObject,
    calls: Sender<((i32, char, String), ThreadId)>,
    gate: Mutex<Option<Receiver<()>>>,
    finished: AtomicBool,
}

impl Worker {
    fn new(calls: Sender<((i32, char, String), ThreadId)>) -> Arc<Self> {
        Arc::new(Self {
            base: ThreadObject::new().unwrap(),
            calls,
            gate: Mutex::new(None),
            finished: AtomicBool::new(false),
        })
    }

    fn on_slot(&self, n: i32, c: char, s: String) {
        if let Some(gate) = self.gate.lock().take() {
            gate.recv_timeout(TIMEOUT).unwrap();
        }
        thread::sleep(Duration::from_millis(20));
        self.finished.store(true, Ordering::SeqCst);
        self.calls.send(((n, c, s), thread::current().id())).unwrap();
    }
}

impl Object for Worker {
    fn object_base(&self) -> &ObjectBase {
        self.base.object_base()
    }
}

#[test]
fn test_queued_delivery_runs_on_receiver_thread_and_returns_early() {
    init_tracing();
    let (calls_tx, calls_rx) = unbounded();
    let (gate_tx, gate_rx) = bounded(1);
    let a = Emitter::new();
    let b = Worker::new(calls_tx);
    *b.gate.lock() = Some(gate_rx);

    connect(&a, &a.sig, &b, Worker::on_slot, ConnectionType::Auto).unwrap();
    a.sig.emit((1, 'c', "222".to_string()));

    // The slot is parked on the gate, yet emit has already returned.
    assert!(!b.finished.load(Ordering::SeqCst));
    gate_tx.send(()).unwrap();

    let (args, ran_on) = calls_rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(args, (1, 'c', "222".to_string()));
    assert_eq!(ran_on, b.base.thread().id());
    assert_ne!(ran_on, thread::current().id());
}

#[test]
fn test_blocking_queued_returns_after_slot_completes() {
    init_tracing();
    let (calls_tx, calls_rx) = unbounded();
    let a = Emitter::new();
    let b = Worker::new(calls_tx);

    connect(&a, &a.sig, &b, Worker::on_slot, ConnectionType::BlockingQueued).unwrap();
    a.sig.emit((1, 'c', "222".to_string()));

    assert!(b.finished.load(Ordering::SeqCst));
    let (args, ran_on) = calls_rx.try_recv().unwrap();
    assert_eq!(args, (1, 'c', "222".to_string()));
    assert_eq!(ran_on, b.base.thread().id());
}

struct Recorder {
    base: ObjectBase,
    seen: Mutex<Vec<(i32, ThreadId)>>,
    notify: Sender<()>,
}

impl Recorder {
    fn on_value(&self, n: i32) {
        self.seen.lock().push((n, thread::current().id()));
        let _ = self.notify.send(());
    }
}

impl Object for Recorder {
    fn object_base(&self) -> &ObjectBase {
        &self.base
    }
}

#[test]
fn test_auto_connection_follows_move_to_thread() {
    init_tracing();
    let (notify_tx, notify_rx) = unbounded();
    let sender = Emitter::new();
    let recorder = Arc::new(Recorder {
        base: ObjectBase::new(),
        seen: Mutex::new(Vec::new()),
        notify: notify_tx,
    });
    let here = thread::current().id();

    connect(&sender, &sender.sig, &recorder, Recorder::on_value, ConnectionType::Auto).unwrap();

    // Same thread: inline, visible as soon as emit returns.
    sender.sig.emit((1, 'a', String::new()));
    assert_eq!(*recorder.seen.lock(), vec![(1, here)]);
    notify_rx.try_recv().unwrap();

    let worker = Thread::new().unwrap();
    recorder.move_to_thread(worker.id());
    sender.sig.emit((2, 'b', String::new()));
    notify_rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(recorder.seen.lock()[1], (2, worker.id()));

    worker.quit();
    worker.join();
}

#[test]
fn test_delivery_to_stopped_loop_is_dropped() {
    init_tracing();
    let (notify_tx, notify_rx) = unbounded();
    let sender = Emitter::new();
    let recorder = Arc::new(Recorder {
        base: ObjectBase::new(),
        seen: Mutex::new(Vec::new()),
        notify: notify_tx,
    });

    let worker = Thread::new().unwrap();
    recorder.move_to_thread(worker.id());
    connect(&sender, &sender.sig, &recorder, Recorder::on_value, ConnectionType::Queued).unwrap();

    worker.quit();
    worker.join();

    sender.sig.emit((3, 'x', String::new()));
    sender.sig.emit((4, 'y', String::new()));
    assert!(notify_rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert!(recorder.seen.lock().is_empty());
}

#[test]
fn test_queued_deliveries_keep_emission_order() {
    let (notify_tx, notify_rx) = unbounded();
    let sender = Emitter::new();
    let recorder = Arc::new(Recorder {
        base: ObjectBase::new(),
        seen: Mutex::new(Vec::new()),
        notify: notify_tx,
    });
    let worker = Thread::new().unwrap();
    recorder.move_to_thread(worker.id());
    connect(&sender, &sender.sig, &recorder, Recorder::on_value, ConnectionType::Queued).unwrap();

    for n in 0..100 {
        sender.sig.emit((n, 'o', String::new()));
    }
    for _ in 0..100 {
        notify_rx.recv_timeout(TIMEOUT).unwrap();
    }

    let values: Vec<i32> = recorder.seen.lock().iter().map(|(n, _)| *n).collect();
    assert_eq!(values, (0..100).collect::<Vec<_>>());

    worker.quit();
    worker.join();
}

#[test]
fn test_concurrent_emitters_deliver_everything() {
    let (notify_tx, notify_rx) = unbounded();
    let sender = Arc::new(Emitter::new());
    let recorder = Arc::new(Recorder {
        base: ObjectBase::new(),
        seen: Mutex::new(Vec::new()),
        notify: notify_tx,
    });
    let worker = Thread::new().unwrap();
    recorder.move_to_thread(worker.id());
    connect(&*sender, &sender.sig, &recorder, Recorder::on_value, ConnectionType::Auto).unwrap();

    let emitters: Vec<_> = (0..4)
        .map(|_| {
            let sender = sender.clone();
            thread::spawn(move || {
                for n in 0..50 {
                    sender.sig.emit((n, 'z', String::new()));
                }
            })
        })
        .collect();
    for emitter in emitters {
        emitter.join().unwrap();
    }
    for _ in 0..200 {
        notify_rx.recv_timeout(TIMEOUT).unwrap();
    }

    let seen = recorder.seen.lock();
    assert_eq!(seen.len(), 200);
    assert!(seen.iter().all(|(_, on)| *on == worker.id()));
    drop(seen);

    worker.quit();
    worker.join();
}

#[test]
fn test_timer_ticks_on_worker_loop() {
    init_tracing();
    let ticks = Arc::new(AtomicUsize::new(0));
    let (tick_tx, tick_rx) = unbounded::<ThreadId>();
    let timer_slot: Arc<Mutex<Option<Timer>>> = Arc::new(Mutex::new(None));

    let ticks_clone = ticks.clone();
    let timer_slot_clone = timer_slot.clone();
    let worker = Thread::spawn(move || {
        let timer = Timer::new();
        timer
            .timeout()
            .connect(move || {
                ticks_clone.fetch_add(1, Ordering::SeqCst);
                let _ = tick_tx.send(thread::current().id());
            })
            .unwrap();
        timer.start(Duration::from_millis(2)).unwrap();
        *timer_slot_clone.lock() = Some(timer);
    })
    .unwrap();

    for _ in 0..3 {
        assert_eq!(tick_rx.recv_timeout(TIMEOUT).unwrap(), worker.id());
    }

    // Stop from the worker's own thread, then confirm ticks settle.
    let timer_slot_clone = timer_slot.clone();
    worker
        .event_loop()
        .unwrap()
        .send_event(move || {
            if let Some(timer) = timer_slot_clone.lock().as_ref() {
                timer.stop();
            }
        })
        .unwrap();
    let at_stop = ticks.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    assert!(ticks.load(Ordering::SeqCst) <= at_stop + 1);

    worker.quit();
    worker.join();
}
