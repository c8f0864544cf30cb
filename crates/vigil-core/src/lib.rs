// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Vigil database gateway.
//!
//! This crate provides the error type, the entity registry and the observer
//! trait shared by the storage gateway and the model layer built on top of it.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::VigilError;
pub use traits::{ChangeObserver, NullObserver};
pub use types::{EntityRegistry, EntityType, FieldSet, WriteAction};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_classified() {
        let open = VigilError::Open {
            path: "/nonexistent/dir/db.sqlite".into(),
            source: Box::new(std::io::Error::other("test")),
        };
        assert!(open.is_fatal());
        assert!(VigilError::NotOpen.is_fatal());
        assert!(VigilError::DanglingStatements.is_fatal());

        assert!(!VigilError::Closed.is_fatal());
        assert!(!VigilError::Config("test".into()).is_fatal());
        assert!(
            !VigilError::Storage {
                source: Box::new(std::io::Error::other("test")),
            }
            .is_fatal()
        );
    }

    #[test]
    fn open_error_names_the_path() {
        let err = VigilError::Open {
            path: "/tmp/missing/vigil.db".into(),
            source: Box::new(std::io::Error::other("no such directory")),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing/vigil.db"), "got: {msg}");
        assert!(msg.contains("no such directory"), "got: {msg}");
    }

    #[test]
    fn null_observer_is_usable_as_trait_object() {
        let observer: std::sync::Arc<dyn ChangeObserver> = std::sync::Arc::new(NullObserver);
        observer.on_change_notification(&EntityType::new("Note"), None);
        observer.on_external_data_change();
    }
}
