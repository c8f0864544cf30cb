// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification queueing and delivery to the [`ChangeObserver`].
//!
//! Notifications never run on the thread that produced them: the update hook
//! fires while SQLite is still inside the statement, so calling back into
//! application code there could re-enter the engine. Delivery happens in order
//! on a dedicated `vigil-dispatch` thread.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};
use vigil_core::{ChangeObserver, EntityType, FieldSet};

#[derive(Debug)]
enum Notification {
    Changed {
        entity: EntityType,
        fields: Option<FieldSet>,
    },
    ExternalChange,
}

/// Sending half of the dispatch thread.
///
/// The thread exits once every clone has been dropped.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    tx: mpsc::Sender<Notification>,
}

impl Dispatcher {
    pub(crate) fn spawn(observer: Arc<dyn ChangeObserver>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Notification>();
        thread::Builder::new()
            .name("vigil-dispatch".into())
            .spawn(move || {
                for notification in rx {
                    match notification {
                        Notification::Changed { entity, fields } => {
                            observer.on_change_notification(&entity, fields.as_ref());
                        }
                        Notification::ExternalChange => observer.on_external_data_change(),
                    }
                }
                debug!("dispatch thread exiting");
            })?;
        Ok(Self { tx })
    }

    pub(crate) fn changed(&self, entity: EntityType, fields: Option<FieldSet>) {
        self.send(Notification::Changed { entity, fields });
    }

    pub(crate) fn external_change(&self) {
        self.send(Notification::ExternalChange);
    }

    fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            warn!("dispatch thread is gone, notification dropped");
        }
    }
}

/// Pending notifications accumulated while queuing is active.
///
/// Queuing nests: only the outermost `finish` flushes.
#[derive(Debug, Default)]
pub(crate) struct NotificationQueue {
    depth: usize,
    pending: BTreeMap<EntityType, Option<FieldSet>>,
}

impl NotificationQueue {
    pub(crate) fn is_queuing(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn begin(&mut self) {
        self.depth += 1;
    }

    /// Merge a notification into the pending set.
    ///
    /// `None` means "unknown fields" and absorbs any field set for the entity.
    pub(crate) fn push(&mut self, entity: EntityType, fields: Option<FieldSet>) {
        match self.pending.entry(entity) {
            Entry::Vacant(slot) => {
                slot.insert(fields);
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), fields) {
                (Some(existing), Some(incoming)) => existing.extend(incoming),
                (existing, _) => *existing = None,
            },
        }
    }

    /// End one level of queuing.
    ///
    /// Returns the notifications to deliver when the outermost level ends,
    /// one per entity, ordered by entity name. Unbalanced calls are ignored.
    pub(crate) fn finish(&mut self) -> Vec<(EntityType, Option<FieldSet>)> {
        match self.depth {
            0 => Vec::new(),
            1 => {
                self.depth = 0;
                std::mem::take(&mut self.pending).into_iter().collect()
            }
            _ => {
                self.depth -= 1;
                Vec::new()
            }
        }
    }
}
