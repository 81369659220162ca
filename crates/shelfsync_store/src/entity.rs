//! Local entities reconciled from remote articles.

use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use shelfsync_protocol::{EntityType, StoreId, Timestamp};
use std::collections::HashMap;
use std::fmt::Write as _;
use uuid::Uuid;

/// A local space, person or conference room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEntity {
    /// Local identity.
    pub id: Uuid,
    /// Owning store.
    pub store_id: StoreId,
    /// Entity kind.
    pub entity_type: EntityType,
    /// Unique id extracted from the remote article.
    pub external_id: String,
    /// Mapped fields.
    pub fields: Map<String, Value>,
    /// Hex SHA-256 of `fields`.
    pub fingerprint: String,
    /// Last write time.
    pub updated_at: Timestamp,
}

impl LocalEntity {
    /// Creates an entity with a fresh id.
    pub fn new(
        store_id: StoreId,
        entity_type: EntityType,
        external_id: impl Into<String>,
        fields: Map<String, Value>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id,
            entity_type,
            external_id: external_id.into(),
            fingerprint: fingerprint(&fields),
            fields,
            updated_at: now,
        }
    }

    /// Replaces the fields if their fingerprint differs. Returns true on change.
    pub fn apply(&mut self, fields: Map<String, Value>, now: Timestamp) -> bool {
        let next = fingerprint(&fields);
        if next == self.fingerprint {
            return false;
        }
        self.fields = fields;
        self.fingerprint = next;
        self.updated_at = now;
        true
    }
}

/// SHA-256 over the canonical JSON encoding of `fields`, hex encoded.
///
/// `serde_json::Map` keeps keys sorted, so equal maps always hash equal
/// regardless of the order the remote system returned them in.
pub fn fingerprint(fields: &Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    // Encoding a map of JSON values cannot fail.
    if let Ok(bytes) = serde_json::to_vec(fields) {
        hasher.update(&bytes);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Storage for local entities.
///
/// Each call is its own transaction; a pull that fails halfway keeps the
/// records it already wrote.
pub trait EntityStore: Send + Sync {
    /// Finds the entity with `external_id` in one store and entity type.
    fn find_by_external_id(
        &self,
        store_id: &StoreId,
        entity_type: EntityType,
        external_id: &str,
    ) -> StoreResult<Option<LocalEntity>>;

    /// Inserts a new entity. Fails if the external id is already taken.
    fn insert(&self, entity: LocalEntity) -> StoreResult<()>;

    /// Overwrites an existing entity.
    fn update(&self, entity: LocalEntity) -> StoreResult<()>;

    /// Lists the entities of a store, optionally of one type.
    fn list(
        &self,
        store_id: &StoreId,
        entity_type: Option<EntityType>,
    ) -> StoreResult<Vec<LocalEntity>>;
}

type EntityKey = (StoreId, EntityType, String);

/// In-memory entity store.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    entities: RwLock<HashMap<EntityKey, LocalEntity>>,
}

impl MemoryEntityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if no entity is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key_of(entity: &LocalEntity) -> EntityKey {
    (
        entity.store_id.clone(),
        entity.entity_type,
        entity.external_id.clone(),
    )
}

impl EntityStore for MemoryEntityStore {
    fn find_by_external_id(
        &self,
        store_id: &StoreId,
        entity_type: EntityType,
        external_id: &str,
    ) -> StoreResult<Option<LocalEntity>> {
        let key = (store_id.clone(), entity_type, external_id.to_string());
        Ok(self.entities.read().get(&key).cloned())
    }

    fn insert(&self, entity: LocalEntity) -> StoreResult<()> {
        let mut entities = self.entities.write();
        let key = key_of(&entity);
        if entities.contains_key(&key) {
            return Err(StoreError::EntityExists {
                store_id: entity.store_id,
                external_id: entity.external_id,
            });
        }
        entities.insert(key, entity);
        Ok(())
    }

    fn update(&self, entity: LocalEntity) -> StoreResult<()> {
        let mut entities = self.entities.write();
        match entities.get_mut(&key_of(&entity)) {
            Some(existing) if existing.id == entity.id => {
                *existing = entity;
                Ok(())
            }
            _ => Err(StoreError::EntityNotFound(entity.id)),
        }
    }

    fn list(
        &self,
        store_id: &StoreId,
        entity_type: Option<EntityType>,
    ) -> StoreResult<Vec<LocalEntity>> {
        let mut out: Vec<LocalEntity> = self
            .entities
            .read()
            .values()
            .filter(|e| &e.store_id == store_id && entity_type.map_or(true, |t| e.entity_type == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.entity_type.as_str(), &a.external_id).cmp(&(b.entity_type.as_str(), &b.external_id))
        });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = fields(json!({"name": "A1", "floor": 2}));
        let b: Map<String, Value> = serde_json::from_str(r#"{"floor":2,"name":"A1"}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
        assert_ne!(fingerprint(&a), fingerprint(&fields(json!({"name": "A2", "floor": 2}))));
    }

    #[test]
    fn apply_reports_changes() {
        let mut entity = LocalEntity::new(
            StoreId::new("s1"),
            EntityType::Spaces,
            "A1",
            fields(json!({"name": "A1"})),
            10,
        );
        assert!(!entity.apply(fields(json!({"name": "A1"})), 20));
        assert_eq!(entity.updated_at, 10);
        assert!(entity.apply(fields(json!({"name": "A1b"})), 30));
        assert_eq!(entity.updated_at, 30);
    }

    #[test]
    fn insert_rejects_duplicate_external_id() {
        let store = MemoryEntityStore::new();
        let entity = LocalEntity::new(StoreId::new("s1"), EntityType::People, "p1", Map::new(), 0);
        store.insert(entity.clone()).unwrap();

        let twin = LocalEntity::new(StoreId::new("s1"), EntityType::People, "p1", Map::new(), 0);
        assert!(matches!(store.insert(twin), Err(StoreError::EntityExists { .. })));

        // Same external id under another type is a different entity.
        let room = LocalEntity::new(StoreId::new("s1"), EntityType::Conference, "p1", Map::new(), 0);
        store.insert(room).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn update_requires_existing_entity() {
        let store = MemoryEntityStore::new();
        let mut entity =
            LocalEntity::new(StoreId::new("s1"), EntityType::Spaces, "A1", Map::new(), 0);
        assert!(store.update(entity.clone()).is_err());

        store.insert(entity.clone()).unwrap();
        entity.apply(fields(json!({"name": "A1"})), 5);
        store.update(entity.clone()).unwrap();

        let found = store
            .find_by_external_id(&StoreId::new("s1"), EntityType::Spaces, "A1")
            .unwrap()
            .unwrap();
        assert_eq!(found, entity);
        assert_eq!(store.list(&StoreId::new("s1"), Some(EntityType::Spaces)).unwrap().len(), 1);
        assert!(store.list(&StoreId::new("s2"), None).unwrap().is_empty());
    }
}
