// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection setup: open, PRAGMAs, and close.
//!
//! The handle returned here is owned by the gateway thread and never shared.
//! Do NOT open additional connections for writes from this process.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, error, warn};
use vigil_core::VigilError;

/// Open (or create) the database at `path` and configure it for the gateway.
///
/// The journal is forced to `DELETE`: in WAL mode commits go to the `-wal`
/// file and the header change counter stops moving.
pub(crate) fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection, VigilError> {
    let open_err = |e: rusqlite::Error| {
        error!(path = %path.display(), error = %e, "cannot open database");
        VigilError::Open {
            path: path.to_path_buf(),
            source: Box::new(e),
        }
    };

    let conn = Connection::open(path).map_err(open_err)?;
    conn.busy_timeout(busy_timeout).map_err(open_err)?;
    let mode: String = conn
        .query_row("PRAGMA journal_mode = DELETE", [], |row| row.get(0))
        .map_err(open_err)?;
    if !mode.eq_ignore_ascii_case("delete") {
        warn!(path = %path.display(), %mode, "journal mode could not be switched to DELETE; change counter may not advance");
    }

    debug!(path = %path.display(), "database opened");
    Ok(conn)
}

/// Close the handle, reporting failures without propagating them.
pub(crate) fn close_connection(conn: Connection, path: &Path) {
    if conn.is_busy() {
        // rusqlite panics when a handle with unfinalized statements is dropped.
        error!(path = %path.display(), "leaking database handle with unfinalized statements");
        std::mem::forget(conn);
        return;
    }
    match conn.close() {
        Ok(()) => debug!(path = %path.display(), "database closed"),
        Err((_conn, e)) => warn!(path = %path.display(), error = %e, "database close failed"),
    }
}

pub(crate) fn storage_err(e: rusqlite::Error) -> VigilError {
    VigilError::Storage {
        source: Box::new(e),
    }
}
