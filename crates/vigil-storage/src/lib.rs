// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialized SQLite gateway with external-write detection.
//!
//! All access to the database file goes through one [`Gateway`] thread. An
//! update hook predicts the header change counter after each of the gateway's
//! own writes, and a kernel file-write subscription compares the live counter
//! with that prediction to spot writes made by other processes.

pub mod counter;
mod database;
mod dispatch;
pub mod gateway;
mod hook;
mod monitor;
mod session;

pub use counter::{read_change_counter, ChangeCounter, COUNTER_OFFSET};
pub use gateway::{Db, Gateway, GatewayOptions};
