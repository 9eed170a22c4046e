use std::collections::HashMap;

use crate::core::{Key, MapperError, Result, Tuple};
use crate::entity::{Entity, EntityId};

/// Instances held by one repository and the records they stand for.
///
/// Three maps move together:
/// - `keys`: every held instance (saved or not) to the key it claims,
/// - `persisted`: key to the instance known to be stored,
/// - `original`: key to the last tuple the store acknowledged.
///
/// A key is in `persisted` exactly when it is in `original`.
pub struct IdentityMap {
    space: String,
    next_id: u64,
    entities: HashMap<EntityId, Entity>,
    keys: HashMap<EntityId, Key>,
    persisted: HashMap<Key, EntityId>,
    original: HashMap<Key, Tuple>,
}

impl IdentityMap {
    pub fn new(space: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            next_id: 1,
            entities: HashMap::new(),
            keys: HashMap::new(),
            persisted: HashMap::new(),
            original: HashMap::new(),
        }
    }

    fn duplicate(&self, key: &Key) -> MapperError {
        MapperError::DuplicateKey {
            space: self.space.clone(),
            key: key.to_string(),
        }
    }

    fn allocate(&mut self, entity: Entity) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, entity);
        id
    }

    /// Takes ownership of a new, unsaved entity claiming `key`.
    ///
    /// Every held key is checked, including keys claimed by instances that
    /// were never saved.
    pub fn adopt(&mut self, entity: Entity, key: Key) -> Result<EntityId> {
        if self.keys.values().any(|held| *held == key) {
            return Err(self.duplicate(&key));
        }
        let id = self.allocate(entity);
        self.keys.insert(id, key);
        Ok(id)
    }

    /// Takes ownership of an entity read from the store.
    pub fn hydrate(&mut self, entity: Entity, key: Key, snapshot: Tuple) -> Result<EntityId> {
        if self.persisted.contains_key(&key) {
            return Err(self.duplicate(&key));
        }
        let id = self.allocate(entity);
        self.keys.insert(id, key.clone());
        self.persisted.insert(key.clone(), id);
        self.original.insert(key, snapshot);
        Ok(id)
    }

    /// Moves an unsaved instance's claim to `key`, failing if any other
    /// held instance claims it already.
    pub fn rekey(&mut self, id: EntityId, key: Key) -> Result<()> {
        let taken = self
            .keys
            .iter()
            .any(|(other, held)| *other != id && *held == key);
        if taken {
            return Err(self.duplicate(&key));
        }
        self.keys.insert(id, key);
        Ok(())
    }

    /// Records `id` as the stored instance for `key` with its acknowledged tuple.
    pub fn register(&mut self, key: Key, id: EntityId, snapshot: Tuple) -> Result<()> {
        if let Some(existing) = self.persisted.get(&key)
            && *existing != id
        {
            return Err(self.duplicate(&key));
        }
        self.keys.insert(id, key.clone());
        self.persisted.insert(key.clone(), id);
        self.original.insert(key, snapshot);
        Ok(())
    }

    pub fn lookup(&self, key: &Key) -> Option<EntityId> {
        self.persisted.get(key).copied()
    }

    /// Membership by instance identity, whatever its fields currently hold.
    pub fn knows(&self, id: EntityId) -> bool {
        self.keys.contains_key(&id)
    }

    pub fn key_of(&self, id: EntityId) -> Option<&Key> {
        self.keys.get(&id)
    }

    /// Whether `id` is the stored instance for the key it claims.
    pub fn is_persisted(&self, id: EntityId) -> bool {
        self.keys
            .get(&id)
            .and_then(|key| self.persisted.get(key))
            .is_some_and(|stored| *stored == id)
    }

    pub fn snapshot(&self, key: &Key) -> Option<&Tuple> {
        self.original.get(key)
    }

    pub fn snapshot_mut(&mut self, key: &Key) -> Option<&mut Tuple> {
        self.original.get_mut(key)
    }

    pub fn set_snapshot(&mut self, key: &Key, snapshot: Tuple) {
        if self.persisted.contains_key(key) {
            self.original.insert(key.clone(), snapshot);
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity> {
        self.entities
            .get_mut(&id)
            .ok_or(MapperError::EntityNotFound(id))
    }

    /// Drops the stored instance for `key` together with its snapshot and
    /// hands the entity back.
    pub fn forget(&mut self, key: &Key) -> Option<Entity> {
        let id = self.persisted.remove(key)?;
        self.original.remove(key);
        self.keys.remove(&id);
        self.entities.remove(&id)
    }

    /// Releases an instance that was never stored.
    pub fn release(&mut self, id: EntityId) -> Option<Entity> {
        if self.is_persisted(id) {
            return None;
        }
        self.keys.remove(&id);
        self.entities.remove(&id)
    }

    /// Number of instances known to be stored.
    pub fn len(&self) -> usize {
        self.persisted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persisted.is_empty()
    }
}
