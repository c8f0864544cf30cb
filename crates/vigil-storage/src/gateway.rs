// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialized access gateway.
//!
//! Every operation on the database runs on one `vigil-db` thread, in the order
//! it was submitted. Callers block (or await) until their unit of work
//! returns; calls made from inside a unit of work run in place.

use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use rusqlite::Connection;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use vigil_config::StorageConfig;
use vigil_core::{ChangeObserver, EntityRegistry, EntityType, FieldSet, VigilError};

use crate::dispatch::{Dispatcher, NotificationQueue};
use crate::monitor::Monitor;
use crate::session;

/// Tunables applied when the handle is opened.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Time SQLite waits on a lock held by another process.
    pub busy_timeout: Duration,
    /// Start monitoring right after the handle first opens.
    pub monitor_on_open: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            monitor_on_open: false,
        }
    }
}

impl From<&StorageConfig> for GatewayOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            busy_timeout: config.busy_timeout(),
            monitor_on_open: config.monitor_external_changes,
        }
    }
}

/// State shared by the gateway handle, its thread and the update hook.
pub(crate) struct Shared {
    pub(crate) path: PathBuf,
    pub(crate) options: GatewayOptions,
    pub(crate) registry: EntityRegistry,
    pub(crate) internal_write: AtomicBool,
    pub(crate) monitor: ArcSwapOption<Monitor>,
    pub(crate) dispatcher: Dispatcher,
    queue: Mutex<NotificationQueue>,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, NotificationQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue or dispatch a change notification for `entity`.
    pub(crate) fn emit(&self, entity: EntityType, fields: Option<FieldSet>) {
        let mut queue = self.queue();
        if queue.is_queuing() {
            queue.push(entity, fields);
        } else {
            drop(queue);
            self.dispatcher.changed(entity, fields);
        }
    }

    fn begin_queuing(&self) {
        self.queue().begin();
    }

    fn end_queuing(&self) {
        let flushed = self.queue().finish();
        for (entity, fields) in flushed {
            self.dispatcher.changed(entity, fields);
        }
    }
}

/// The open handle as seen by a unit of work.
///
/// Dereferences to [`rusqlite::Connection`].
pub struct Db<'a> {
    conn: &'a Connection,
    shared: &'a Shared,
}

impl<'a> Db<'a> {
    pub(crate) fn new(conn: &'a Connection, shared: &'a Shared) -> Self {
        Self { conn, shared }
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }

    /// Run writes the caller reports itself through [`post_change`](Self::post_change).
    ///
    /// Row writes inside `f` still update the change prediction but produce no
    /// hook notification.
    pub fn internal_write<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        let _guard = InternalWrite::enter(&self.shared.internal_write);
        f(self.conn)
    }

    /// Report a change to `entity`, optionally naming the fields that changed.
    ///
    /// Accumulated while queuing is active, otherwise delivered asynchronously.
    pub fn post_change(&self, entity: &EntityType, fields: Option<FieldSet>) {
        self.shared.emit(entity.clone(), fields);
    }
}

impl Deref for Db<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

/// Sets the internal-write flag and restores the previous value on drop.
struct InternalWrite<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> InternalWrite<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::AcqRel);
        Self { flag, previous }
    }
}

impl Drop for InternalWrite<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::Release);
    }
}

type Job = Box<dyn FnOnce(&Arc<Shared>) + Send>;

enum Command {
    Run(Job),
    Shutdown,
}

/// The `vigil-db` thread and its queue.
struct Worker {
    tx: mpsc::Sender<Command>,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(shared: Arc<Shared>) -> Result<Self, VigilError> {
        let (tx, rx) = mpsc::channel::<Command>();
        let handle = thread::Builder::new()
            .name("vigil-db".into())
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    match command {
                        Command::Run(job) => job(&shared),
                        Command::Shutdown => break,
                    }
                }
                session::close(&shared);
                debug!(path = %shared.path.display(), "gateway thread exiting");
            })
            .map_err(|e| VigilError::Internal(format!("cannot spawn gateway thread: {e}")))?;

        Ok(Self {
            tx,
            thread_id: handle.thread().id(),
            handle: Some(handle),
        })
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn submit(&self, job: Job) -> Result<(), VigilError> {
        self.tx
            .send(Command::Run(job))
            .map_err(|_| VigilError::Closed)
    }

    fn shutdown(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        // Dropped from inside a unit of work: the thread finishes on its own.
        if self.is_current() {
            return;
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("gateway thread panicked during shutdown");
        }
    }
}

/// Serialized gateway to one database file.
///
/// The handle opens lazily on first use. Row writes to registered tables
/// produce change notifications; once monitoring is started, writes that the
/// gateway cannot attribute to itself produce "changed externally".
///
/// ```no_run
/// use std::sync::Arc;
/// use vigil_core::{EntityRegistry, EntityType, NullObserver};
/// use vigil_storage::Gateway;
///
/// let registry = EntityRegistry::new().with("notes", EntityType::new("Note"));
/// let gateway = Gateway::new("/tmp/notes.db", registry, Arc::new(NullObserver))?;
/// gateway.in_database(|db| db.execute_batch("CREATE TABLE IF NOT EXISTS notes (body TEXT)"))?;
/// gateway.start_monitoring_external_changes()?;
/// gateway.in_database(|db| db.execute("INSERT INTO notes (body) VALUES ('hi')", []))?;
/// gateway.close()?;
/// # Ok::<(), vigil_core::VigilError>(())
/// ```
pub struct Gateway {
    shared: Arc<Shared>,
    worker: Worker,
}

impl Gateway {
    pub fn new(
        path: impl Into<PathBuf>,
        registry: EntityRegistry,
        observer: Arc<dyn ChangeObserver>,
    ) -> Result<Self, VigilError> {
        Self::with_options(path, GatewayOptions::default(), registry, observer)
    }

    /// Build a gateway from the `[storage]` configuration section.
    pub fn from_config(
        config: &StorageConfig,
        registry: EntityRegistry,
        observer: Arc<dyn ChangeObserver>,
    ) -> Result<Self, VigilError> {
        Self::with_options(config.database_path(), config.into(), registry, observer)
    }

    pub fn with_options(
        path: impl Into<PathBuf>,
        options: GatewayOptions,
        registry: EntityRegistry,
        observer: Arc<dyn ChangeObserver>,
    ) -> Result<Self, VigilError> {
        let dispatcher = Dispatcher::spawn(observer)
            .map_err(|e| VigilError::Internal(format!("cannot spawn dispatch thread: {e}")))?;
        let shared = Arc::new(Shared {
            path: path.into(),
            options,
            registry,
            internal_write: AtomicBool::new(false),
            monitor: ArcSwapOption::empty(),
            dispatcher,
            queue: Mutex::new(NotificationQueue::default()),
        });
        let worker = Worker::spawn(Arc::clone(&shared))?;
        Ok(Self { shared, worker })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Run `f` on the gateway thread and wait for its result.
    ///
    /// A panic inside `f` is resumed on the calling thread; the gateway thread
    /// keeps serving later calls.
    fn perform<F, R>(&self, f: F) -> Result<R, VigilError>
    where
        F: FnOnce(&Arc<Shared>) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.worker.is_current() {
            return Ok(f(&self.shared));
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.worker.submit(Box::new(move |shared| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(shared)));
            let _ = reply_tx.send(outcome);
        }))?;
        match reply_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(VigilError::Closed),
        }
    }

    /// Open the handle now instead of on first use.
    pub fn open(&self) -> Result<(), VigilError> {
        self.perform(|shared| session::ensure_open(shared).map(drop))?
    }

    /// Execute `f` with exclusive access to the handle.
    ///
    /// Blocks until `f` has run. Called from inside another unit of work, `f`
    /// runs immediately on the same handle.
    pub fn in_database<F, R>(&self, f: F) -> Result<R, VigilError>
    where
        F: FnOnce(&Db<'_>) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.perform(move |shared| session::run(shared, f))?
    }

    /// Async variant of [`in_database`](Self::in_database) for tokio callers.
    pub async fn call<F, R>(&self, f: F) -> Result<R, VigilError>
    where
        F: FnOnce(&Db<'_>) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        if self.worker.is_current() {
            return session::run(&self.shared, f);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.worker.submit(Box::new(move |shared| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| session::run(shared, f)));
            let _ = reply_tx.send(outcome);
        }))?;
        match reply_rx.await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(VigilError::Closed),
        }
    }

    /// Start watching the file for writes made outside this gateway.
    ///
    /// The handle must already be open. Starting twice is a no-op.
    pub fn start_monitoring_external_changes(&self) -> Result<(), VigilError> {
        self.perform(|shared| session::start_monitoring(shared))?
    }

    /// Stop watching the file. Idempotent.
    pub fn stop_monitoring_external_changes(&self) -> Result<(), VigilError> {
        self.perform(|shared| session::stop_monitoring(shared))
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared.monitor.load().is_some()
    }

    /// Hold change notifications until the matching [`end_queuing`](Self::end_queuing).
    ///
    /// Calls nest; only the outermost end flushes.
    pub fn begin_queuing(&self) -> Result<(), VigilError> {
        self.perform(|shared| shared.begin_queuing())
    }

    /// Flush one notification per entity changed since queuing began.
    pub fn end_queuing(&self) -> Result<(), VigilError> {
        self.perform(|shared| shared.end_queuing())
    }

    /// Stop monitoring and close the handle. Idempotent; a later call reopens lazily.
    pub fn close(&self) -> Result<(), VigilError> {
        self.perform(|shared| session::close(shared))
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.worker.shutdown();
    }
}
