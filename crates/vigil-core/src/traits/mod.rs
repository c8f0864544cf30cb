// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits implemented by the layer sitting above the gateway.

pub mod observer;

pub use observer::{ChangeObserver, NullObserver};
