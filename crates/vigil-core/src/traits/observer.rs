// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change observer trait receiving gateway notifications.

use crate::types::{EntityType, FieldSet};

/// Receives change notifications produced by the gateway.
///
/// Callbacks are delivered in order on the gateway's dispatch thread, never on
/// the thread that performed the write. Implementations must not block for
/// long: every later notification waits behind them.
pub trait ChangeObserver: Send + Sync {
    /// Rows of `entity` changed.
    ///
    /// `fields` is `None` when the change came from the row-level hook, which
    /// cannot tell which columns were written.
    fn on_change_notification(&self, entity: &EntityType, fields: Option<&FieldSet>);

    /// The database file was written by something other than this gateway.
    fn on_external_data_change(&self);
}

/// Observer that discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ChangeObserver for NullObserver {
    fn on_change_notification(&self, _entity: &EntityType, _fields: Option<&FieldSet>) {}

    fn on_external_data_change(&self) {}
}
