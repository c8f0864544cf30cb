// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge from SQLite's update hook to change predictions and notifications.
//!
//! The hook fires synchronously inside the statement for every inserted,
//! updated or deleted row, before the transaction commits.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rusqlite::hooks::Action;
use rusqlite::Connection;
use tracing::trace;
use vigil_core::WriteAction;

use crate::gateway::Shared;

/// Register the bridge on `conn`. One registration per handle.
pub(crate) fn install(conn: &Connection, shared: Arc<Shared>) {
    conn.update_hook(Some(
        move |action: Action, _db: &str, table: &str, _rowid: i64| {
            on_row_write(&shared, action, table);
        },
    ));
}

/// Remove the bridge, releasing its reference to the gateway state.
pub(crate) fn uninstall(conn: &Connection) {
    conn.update_hook(None::<fn(Action, &str, &str, i64)>);
}

fn on_row_write(shared: &Shared, action: Action, table: &str) {
    let Some(action) = write_action(action) else {
        return;
    };
    let Some(entity) = shared.registry.resolve(table) else {
        return;
    };
    // Nothing to compare against until monitoring starts.
    let Some(monitor) = shared.monitor.load_full() else {
        return;
    };

    monitor.predict_next_write();
    if shared.internal_write.load(Ordering::Acquire) {
        return;
    }

    trace!(%entity, %action, table, "row write observed by hook");
    shared.emit(entity.clone(), None);
}

fn write_action(action: Action) -> Option<WriteAction> {
    match action {
        Action::SQLITE_INSERT => Some(WriteAction::Insert),
        Action::SQLITE_UPDATE => Some(WriteAction::Update),
        Action::SQLITE_DELETE => Some(WriteAction::Delete),
        _ => None,
    }
}
