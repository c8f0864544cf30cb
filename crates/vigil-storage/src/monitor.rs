// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External-change monitor.
//!
//! A kernel file-write subscription feeds a dedicated `vigil-monitor` thread.
//! On macOS the subscription uses kqueue vnode events rather than `notify`'s
//! default FSEvents backend, which coalesces writes and delivers them late. That thread owns the
//! counter descriptor, the subscription and the predicted change count, and is
//! the only place the prediction is read or written: the update hook and the
//! gateway reach it by sending closures into the same queue, which serializes
//! their updates against incoming file events.

use std::path::Path;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use notify::{Event, RecursiveMode, Watcher};
use tracing::{debug, info, warn};
use vigil_core::VigilError;

use crate::counter::ChangeCounter;
use crate::dispatch::Dispatcher;

#[cfg(target_os = "macos")]
type FileWatcher = notify::KqueueWatcher;
#[cfg(not(target_os = "macos"))]
type FileWatcher = notify::RecommendedWatcher;

type Job = Box<dyn FnOnce(&mut MonitorState) + Send>;

enum Message {
    FileWritten,
    Run(Job),
    Stop,
}

/// State owned by the monitor thread.
///
/// Dropping it closes the counter descriptor and cancels the subscription.
pub(crate) struct MonitorState {
    counter: ChangeCounter,
    watcher: FileWatcher,
    expected_change_count: u32,
    // Prediction that `expected_change_count` replaced. A file event for our
    // previous commit can be processed after the hook already predicted the
    // next one, and must not count as foreign.
    superseded_change_count: u32,
    signal: Dispatcher,
}

impl MonitorState {
    fn read_counter(&mut self) -> u32 {
        self.counter.read()
    }

    fn adopt(&mut self, value: u32) {
        if value != self.expected_change_count {
            self.superseded_change_count = self.expected_change_count;
            self.expected_change_count = value;
        }
    }

    fn on_file_written(&mut self) {
        let observed = self.read_counter();
        if observed == self.expected_change_count || observed == self.superseded_change_count {
            return;
        }
        info!(
            expected = self.expected_change_count,
            observed, "database changed externally"
        );
        self.signal.external_change();
        self.adopt(observed);
    }

    /// Record that a write is about to commit.
    fn predict_next_write(&mut self) {
        let next = self.read_counter().wrapping_add(1);
        self.adopt(next);
    }

    /// Forget every earlier prediction and expect `value` from now on.
    fn anchor(&mut self, value: u32) {
        self.expected_change_count = value;
        self.superseded_change_count = value;
    }

    /// Compare the counter after a unit of work with the value sampled before it.
    ///
    /// Once a unit has returned, none of its writes is pending. A prediction
    /// still one ahead of the file belongs to a write that rolled back or
    /// failed, and would otherwise swallow the next foreign commit.
    fn check_unit_of_work(&mut self, before: u32) {
        let after = self.read_counter();
        let delta = after.wrapping_sub(before);
        if delta > 1 {
            warn!(
                before,
                after, delta, "unit of work saw more than one commit, treating as external change"
            );
            self.signal.external_change();
            self.anchor(after);
        } else if self.expected_change_count == after.wrapping_add(1) {
            debug!(
                expected = self.expected_change_count,
                after, "predicted write never committed"
            );
            self.anchor(after);
        }
    }
}

/// Handle on a running monitor thread.
pub(crate) struct Monitor {
    tx: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Open the counter descriptor, wire the subscription and start watching.
    ///
    /// The subscription starts delivering only after the thread consuming its
    /// events is running; watching the path is the last step.
    pub(crate) fn start(path: &Path, signal: Dispatcher) -> Result<Self, VigilError> {
        let mut counter = ChangeCounter::open(path).map_err(monitor_err)?;
        counter.verify_header()?;
        let initial = counter.read();

        let (tx, rx) = mpsc::channel::<Message>();
        let events = tx.clone();
        let watcher = FileWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) if event.kind.is_modify() => {
                    // Receiver gone means monitoring stopped; nothing to report.
                    let _ = events.send(Message::FileWritten);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "file watcher error"),
            },
            notify::Config::default(),
        )
        .map_err(monitor_err)?;

        let mut state = MonitorState {
            counter,
            watcher,
            expected_change_count: initial,
            superseded_change_count: initial,
            signal,
        };
        let handle = thread::Builder::new()
            .name("vigil-monitor".into())
            .spawn(move || {
                while let Ok(message) = rx.recv() {
                    match message {
                        Message::FileWritten => state.on_file_written(),
                        Message::Run(job) => job(&mut state),
                        Message::Stop => break,
                    }
                }
                debug!("monitor thread exiting");
            })
            .map_err(monitor_err)?;

        let monitor = Self {
            tx,
            thread: Mutex::new(Some(handle)),
        };
        let watch_path = path.to_path_buf();
        let resumed = monitor
            .sync(move |state| {
                state
                    .watcher
                    .watch(&watch_path, RecursiveMode::NonRecursive)
            })
            .ok_or_else(|| VigilError::Internal("monitor thread exited during start".into()))?;
        if let Err(e) = resumed {
            monitor.stop();
            return Err(monitor_err(e));
        }

        debug!(path = %path.display(), counter = initial, "monitor started");
        Ok(monitor)
    }

    /// Run `f` on the monitor thread and wait for its result.
    ///
    /// Returns `None` once the monitor has stopped.
    fn sync<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut MonitorState) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |state| {
            let _ = reply_tx.send(f(state));
        });
        self.tx.send(Message::Run(job)).ok()?;
        reply_rx.recv().ok()
    }

    /// Live counter value, 0 once stopped.
    pub(crate) fn read_counter(&self) -> u32 {
        self.sync(MonitorState::read_counter).unwrap_or(0)
    }

    pub(crate) fn predict_next_write(&self) {
        self.sync(MonitorState::predict_next_write);
    }

    pub(crate) fn check_unit_of_work(&self, before: u32) {
        self.sync(move |state| state.check_unit_of_work(before));
    }

    /// Cancel the subscription and close both descriptors. Idempotent.
    pub(crate) fn stop(&self) {
        let _ = self.tx.send(Message::Stop);
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("monitor thread panicked");
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_err(e: impl std::error::Error + Send + Sync + 'static) -> VigilError {
    VigilError::Monitor {
        source: Box::new(e),
    }
}
