// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observer that records every notification for assertions.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use vigil_core::{ChangeObserver, EntityType, FieldSet};

#[derive(Debug, Default)]
struct Recorded {
    changes: Vec<(EntityType, Option<FieldSet>)>,
    external: usize,
}

/// Captures change and external-change callbacks.
///
/// Notifications arrive on the gateway's dispatch thread, so tests wait on
/// them with a deadline instead of asserting immediately.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    recorded: Mutex<Recorded>,
    arrived: Condvar,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().expect("observer mutex poisoned")
    }

    /// All change notifications received so far, in delivery order.
    pub fn changes(&self) -> Vec<(EntityType, Option<FieldSet>)> {
        self.lock().changes.clone()
    }

    pub fn change_count(&self) -> usize {
        self.lock().changes.len()
    }

    /// Number of change notifications received for the entity named `name`.
    pub fn change_count_for(&self, name: &str) -> usize {
        self.lock()
            .changes
            .iter()
            .filter(|(entity, _)| entity.name() == name)
            .count()
    }

    pub fn external_count(&self) -> usize {
        self.lock().external
    }

    /// Wait until at least `n` change notifications arrived. Returns whether they did.
    pub fn wait_for_changes(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |r| r.changes.len() >= n)
    }

    /// Wait until at least `n` external-change signals arrived. Returns whether they did.
    pub fn wait_for_external(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |r| r.external >= n)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Recorded) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut recorded = self.lock();
        while !done(&recorded) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            recorded = self
                .arrived
                .wait_timeout(recorded, deadline - now)
                .expect("observer mutex poisoned")
                .0;
        }
        true
    }

    /// Give in-flight file events time to be delivered before asserting absence.
    pub fn settle(&self, quiet: Duration) {
        std::thread::sleep(quiet);
    }
}

impl ChangeObserver for RecordingObserver {
    fn on_change_notification(&self, entity: &EntityType, fields: Option<&FieldSet>) {
        self.lock().changes.push((entity.clone(), fields.cloned()));
        self.arrived.notify_all();
    }

    fn on_external_data_change(&self) {
        self.lock().external += 1;
        self.arrived.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_counts_per_entity() {
        let observer = RecordingObserver::new();
        observer.on_change_notification(&EntityType::new("Note"), None);
        observer.on_change_notification(&EntityType::new("Tag"), None);
        observer.on_change_notification(&EntityType::new("Note"), None);
        observer.on_external_data_change();

        assert_eq!(observer.change_count(), 3);
        assert_eq!(observer.change_count_for("Note"), 2);
        assert_eq!(observer.external_count(), 1);
    }

    #[test]
    fn wait_returns_false_on_timeout() {
        let observer = RecordingObserver::new();
        assert!(!observer.wait_for_external(1, Duration::from_millis(20)));
    }

    #[test]
    fn wait_wakes_on_delivery_from_another_thread() {
        let observer = RecordingObserver::new();
        let sender = Arc::clone(&observer);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            sender.on_external_data_change();
        });

        assert!(observer.wait_for_external(1, Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
