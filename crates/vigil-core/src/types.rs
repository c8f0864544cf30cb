// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared between the gateway and its collaborators.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Names of the fields a notification reports as changed.
pub type FieldSet = BTreeSet<String>;

/// Handle identifying a table-backed entity type.
///
/// Cheap to clone; compares and hashes by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(Arc<str>);

impl EntityType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Row-level write reported by the engine's update hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WriteAction {
    Insert,
    Update,
    Delete,
}

/// Mapping from table name to the entity type stored in it.
///
/// Built once before the gateway is constructed and never mutated afterwards,
/// so the update hook can consult it without synchronization.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    tables: HashMap<String, EntityType>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entity` as the type backed by `table`.
    ///
    /// Re-registering a table replaces the previous entity type.
    pub fn register(&mut self, table: impl Into<String>, entity: EntityType) -> &mut Self {
        self.tables.insert(table.into(), entity);
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, table: impl Into<String>, entity: EntityType) -> Self {
        self.register(table, entity);
        self
    }

    /// Resolve a table name to its entity type. Unregistered tables yield `None`.
    pub fn resolve(&self, table: &str) -> Option<&EntityType> {
        self.tables.get(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_registered_tables_only() {
        let registry = EntityRegistry::new()
            .with("notes", EntityType::new("Note"))
            .with("tags", EntityType::new("Tag"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("notes"), Some(&EntityType::new("Note")));
        assert_eq!(registry.resolve("tags").map(EntityType::name), Some("Tag"));
        assert!(registry.resolve("sqlite_sequence").is_none());
    }

    #[test]
    fn reregistering_a_table_replaces_entity() {
        let mut registry = EntityRegistry::new();
        registry.register("notes", EntityType::new("Note"));
        registry.register("notes", EntityType::new("Memo"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("notes"), Some(&EntityType::new("Memo")));
    }

    #[test]
    fn entity_type_serializes_as_plain_string() {
        let json = serde_json::to_string(&EntityType::new("Note")).expect("should serialize");
        assert_eq!(json, "\"Note\"");
    }

    #[test]
    fn entity_type_deserializes_from_plain_string() {
        let entity: EntityType = serde_json::from_str("\"Tag\"").expect("should deserialize");
        assert_eq!(entity, EntityType::new("Tag"));
        assert_eq!(entity.name(), "Tag");
    }

    #[test]
    fn write_action_display_is_lowercase() {
        assert_eq!(WriteAction::Insert.to_string(), "insert");
        assert_eq!(WriteAction::Delete.to_string(), "delete");
    }
}
