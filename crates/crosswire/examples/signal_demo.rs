//! Crosswire signal/slot demo.
//!
//! Walks through the main delivery modes:
//! - A button on the main thread driving a label on a worker thread (Auto)
//! - A progress signal feeding a slot that takes only some of its arguments
//! - A blocking queued request to the worker
//! - A timer on the worker thread, torn down with `delete_later`
//!
//! Run with: cargo run -p crosswire --example signal_demo

use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use crosswire::prelude::*;
use parking_lot::Mutex;
use tracing::{Level, error, info};

#[derive(Object)]
#[object(crate = crosswire)]
struct Button {
    base: ObjectBase,

    #[signal]
    clicked: Signal<(u32,)>,

    #[signal]
    progress: Signal<(u32, String, f64)>,
}

#[derive(Object)]
#[object(crate = crosswire)]
struct Label {
    #[object(base)]
    worker: ThreadObject,
    lines: Mutex<Vec<String>>,
}

impl Label {
    fn on_clicked(&self, count: u32) {
        self.push(format!("clicked {count} times"));
    }

    fn on_progress(&self, step: u32, fraction: f64) {
        self.push(format!("step {step}: {:.0}%", fraction * 100.0));
    }

    fn push(&self, line: String) {
        info!(thread = ?std::thread::current().name(), %line, "label updated");
        self.lines.lock().push(line);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let button = Button {
        base: ObjectBase::new(),
        clicked: Signal::new(),
        progress: Signal::new(),
    };
    let label = Arc::new(Label {
        worker: ThreadObject::with_config(ThreadConfig::with_name("label-worker"))?,
        lines: Mutex::new(Vec::new()),
    });
    info!(signals = ?button.signal_names(), "button created");

    // Auto: the label lives on its worker thread, so deliveries are queued there.
    connect(&button, &button.clicked, &label, Label::on_clicked, ConnectionType::Auto)?;
    // The slot takes the first and last of the three progress arguments.
    connect(&button, &button.progress, &label, Label::on_progress, ConnectionType::BlockingQueued)?;

    for count in 1..=3 {
        button.clicked.emit((count,));
    }
    button.progress.emit((1, "loading".to_string(), 0.5));
    // The blocking delivery above has run, and the queued clicks ran before it.
    info!(lines = ?label.lines.lock(), "after blocking emit");

    // Ask the label's thread which thread it is, waiting for the answer.
    let seen_on: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));
    let seen_on_clone = seen_on.clone();
    label.invoke_method(
        move || *seen_on_clone.lock() = Some(std::thread::current().id()),
        ConnectionType::BlockingQueued,
    )?;
    info!(same = *seen_on.lock() == Some(label.thread_id()), "invoke_method ran on the label thread");

    // A timer created on the worker thread ticks on the worker's loop.
    let ticks = Arc::new(Mutex::new(0u32));
    let holder: Arc<Mutex<Option<Arc<Timer>>>> = Arc::new(Mutex::new(None));
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let ticks_clone = ticks.clone();
    label.invoke_method(
        move || {
            let timer = Arc::new(Timer::new());
            let holder_clone = holder.clone();
            let connected = timer.timeout().connect(move || {
                let mut ticks = ticks_clone.lock();
                *ticks += 1;
                if *ticks == 3 {
                    if let Some(timer) = holder_clone.lock().take() {
                        timer.stop();
                        timer.delete_later();
                    }
                    let _ = done_tx.send(());
                }
            });
            if let Err(err) = connected {
                error!(%err, "failed to connect timer");
                return;
            }
            match timer.start(Duration::from_millis(10)) {
                Ok(()) => *holder.lock() = Some(timer),
                Err(err) => error!(%err, "failed to start timer"),
            }
        },
        ConnectionType::Queued,
    )?;
    done_rx.recv_timeout(Duration::from_secs(5))?;
    info!(ticks = *ticks.lock(), "timer finished");

    // Dropping the label quits its thread and severs its connections.
    drop(label);
    info!(
        clicked = button.clicked.connection_count(),
        progress = button.progress.connection_count(),
        "connections after label dropped"
    );

    Ok(())
}
