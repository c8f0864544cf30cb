// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Vigil integration tests.
//!
//! # Components
//!
//! - [`RecordingObserver`] - Observer capturing notifications, with timed waits
//! - [`TestDb`] - Scratch database file with a small schema
//! - [`external_write`] - Commit through an independent connection, as a foreign writer would

pub mod fixture;
pub mod recording_observer;

pub use fixture::{external_write, notes_registry, TestDb};
pub use recording_observer::RecordingObserver;
