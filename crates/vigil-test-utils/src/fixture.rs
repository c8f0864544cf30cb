// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scratch databases and a foreign writer for gateway tests.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::TempDir;
use tracing::debug;
use vigil_core::{EntityRegistry, EntityType};

/// Schema used by most gateway tests.
pub const NOTES_SCHEMA: &str = "
CREATE TABLE notes (id INTEGER PRIMARY KEY, title TEXT NOT NULL, body TEXT);
CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT NOT NULL);
CREATE TABLE audit (id INTEGER PRIMARY KEY, entry TEXT);
";

/// Registry mapping `notes` to `Note` and `tags` to `Tag`; `audit` stays unregistered.
pub fn notes_registry() -> EntityRegistry {
    EntityRegistry::new()
        .with("notes", EntityType::new("Note"))
        .with("tags", EntityType::new("Tag"))
}

/// A database file in its own temporary directory, removed on drop.
pub struct TestDb {
    dir: TempDir,
    path: PathBuf,
}

impl TestDb {
    /// A path to a database file that does not exist yet.
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("vigil-test.db");
        Self { dir, path }
    }

    /// A database file already holding [`NOTES_SCHEMA`].
    pub fn with_notes_schema() -> Self {
        let db = Self::empty();
        let conn = Connection::open(&db.path).expect("open scratch database");
        conn.execute_batch(NOTES_SCHEMA).expect("create schema");
        db
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Run `sql` as one transaction through a fresh, independent connection.
///
/// The gateway cannot see this write coming: it neither runs through the
/// gateway thread nor fires the gateway's update hook.
pub fn external_write(path: &Path, sql: &str) -> rusqlite::Result<()> {
    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    tx.commit()?;
    debug!(path = %path.display(), "external write committed");
    conn.close().map_err(|(_, e)| e)
}
