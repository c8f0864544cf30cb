// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handle lifecycle on the gateway thread.
//!
//! Everything here runs on the `vigil-db` thread. The open handle lives in a
//! thread-local so that a unit of work calling back into the gateway can run
//! in place on the same handle instead of queueing behind itself.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{error, info};
use vigil_core::VigilError;

use crate::database::{close_connection, open_connection, storage_err};
use crate::gateway::{Db, Shared};
use crate::hook;
use crate::monitor::Monitor;

thread_local! {
    static HANDLE: RefCell<Option<Rc<Connection>>> = const { RefCell::new(None) };
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks a unit of work as running; restores the depth on drop or unwind.
struct Nesting {
    outermost: bool,
}

impl Nesting {
    fn enter() -> Self {
        let depth = DEPTH.with(|d| {
            let depth = d.get();
            d.set(depth + 1);
            depth
        });
        Self {
            outermost: depth == 0,
        }
    }
}

impl Drop for Nesting {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

fn current() -> Option<Rc<Connection>> {
    HANDLE.with(|h| h.borrow().clone())
}

pub(crate) fn is_open() -> bool {
    HANDLE.with(|h| h.borrow().is_some())
}

/// Return the open handle, opening it and installing the hook on first use.
pub(crate) fn ensure_open(shared: &Arc<Shared>) -> Result<Rc<Connection>, VigilError> {
    if let Some(conn) = current() {
        return Ok(conn);
    }

    let conn = Rc::new(open_connection(&shared.path, shared.options.busy_timeout)?);
    hook::install(&conn, Arc::clone(shared));
    HANDLE.with(|h| *h.borrow_mut() = Some(Rc::clone(&conn)));
    info!(path = %shared.path.display(), "database handle opened");

    if shared.options.monitor_on_open {
        start_monitoring(shared)?;
    }
    Ok(conn)
}

/// Run one unit of work with change-count accounting around it.
///
/// Only the outermost unit on the gateway thread is checked for dangling
/// statements and compared against the change counter.
pub(crate) fn run<F, R>(shared: &Arc<Shared>, f: F) -> Result<R, VigilError>
where
    F: FnOnce(&Db<'_>) -> rusqlite::Result<R>,
{
    let conn = ensure_open(shared)?;
    let nesting = Nesting::enter();
    // A nested unit is part of the outer one, which may still be stepping a
    // statement; accounting happens once the outermost unit returns.
    if !nesting.outermost {
        return f(&Db::new(&conn, shared)).map_err(storage_err);
    }

    let monitor = shared.monitor.load_full();
    let before = monitor.as_ref().map_or(0, |m| m.read_counter());

    let result = f(&Db::new(&conn, shared));

    if let Some(monitor) = &monitor {
        monitor.check_unit_of_work(before);
    }
    if conn.is_busy() {
        error!(path = %shared.path.display(), "unit of work left prepared statements open");
        return Err(VigilError::DanglingStatements);
    }
    result.map_err(storage_err)
}

pub(crate) fn start_monitoring(shared: &Arc<Shared>) -> Result<(), VigilError> {
    if !is_open() {
        error!(path = %shared.path.display(), "monitoring requested before the handle was opened");
        return Err(VigilError::NotOpen);
    }
    if shared.monitor.load().is_some() {
        return Ok(());
    }

    let monitor = Monitor::start(&shared.path, shared.dispatcher.clone())?;
    shared.monitor.store(Some(Arc::new(monitor)));
    info!(path = %shared.path.display(), "monitoring external changes");
    Ok(())
}

/// Stop monitoring. Runs between units of work, so the counter descriptor
/// never closes while the engine holds a lock on the file.
pub(crate) fn stop_monitoring(shared: &Shared) {
    if let Some(monitor) = shared.monitor.swap(None) {
        monitor.stop();
        info!(path = %shared.path.display(), "stopped monitoring external changes");
    }
}

/// Tear down monitoring, the hook and the handle. Idempotent.
pub(crate) fn close(shared: &Shared) {
    stop_monitoring(shared);

    let Some(conn) = HANDLE.with(|h| h.borrow_mut().take()) else {
        return;
    };
    hook::uninstall(&conn);
    match Rc::try_unwrap(conn) {
        Ok(conn) => close_connection(conn, &shared.path),
        // Closed from inside a unit of work: the outer call drops the last
        // reference when it returns.
        Err(_in_use) => info!(path = %shared.path.display(), "handle closes after the running unit of work"),
    }
}
