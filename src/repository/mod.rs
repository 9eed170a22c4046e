//! Unit of work for one space.
//!
//! A [`Repository`] owns every entity it hands out, keeps one instance per
//! stored record, remembers the last tuple the store acknowledged for each
//! of them and sends only changed positions on save.

pub mod cache;
pub mod diff;
pub mod identity;
pub mod keys;
mod query;

use std::sync::Arc;

use tracing::{Level, event, info_span};

use crate::client::{Operator, StorageClient, UpdateOp};
use crate::config::MapperConfig;
use crate::core::{Key, MapperError, Params, Result, Tuple, Value, ValueKind};
use crate::entity::{Entity, EntityId};
use crate::plugins::{Hook, PluginRegistry};
use crate::procedure::FindOrCreateProcedure;
use crate::schema::Space;

pub use cache::{Found, QueryCache};
pub use identity::IdentityMap;

pub struct Repository {
    space: Arc<Space>,
    client: Arc<dyn StorageClient>,
    plugins: Arc<PluginRegistry>,
    procedure: Option<Arc<dyn FindOrCreateProcedure>>,
    identity: IdentityMap,
    cache: QueryCache,
}

impl Repository {
    /// A repository with no plugins, no find-or-create procedure and the
    /// default cache.
    pub fn new(space: Arc<Space>, client: Arc<dyn StorageClient>) -> Self {
        let identity = IdentityMap::new(space.name());
        let cache = MapperConfig::default()
            .capacity()
            .map_or_else(QueryCache::disabled, QueryCache::new);
        Self {
            space,
            client,
            plugins: Arc::new(PluginRegistry::new()),
            procedure: None,
            identity,
            cache,
        }
    }

    pub fn with_plugins(mut self, plugins: Arc<PluginRegistry>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_procedure(mut self, procedure: Arc<dyn FindOrCreateProcedure>) -> Self {
        self.procedure = Some(procedure);
        self
    }

    pub fn with_config(mut self, config: &MapperConfig) -> Self {
        self.cache = config
            .capacity()
            .map_or_else(QueryCache::disabled, QueryCache::new);
        if !config.find_or_create_procedure {
            self.procedure = None;
        }
        self
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.identity.entity(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Result<&mut Entity> {
        self.identity.entity_mut(id)
    }

    /// Sets a field that belongs to the space format.
    pub fn set(&mut self, id: EntityId, field: &str, value: impl Into<Value>) -> Result<()> {
        self.space.field_position(field)?;
        self.identity.entity_mut(id)?.set(field, value);
        Ok(())
    }

    pub fn knows(&self, id: EntityId) -> bool {
        self.identity.knows(id)
    }

    pub fn is_persisted(&self, id: EntityId) -> bool {
        self.identity.is_persisted(id)
    }

    pub fn key_of(&self, id: EntityId) -> Option<&Key> {
        self.identity.key_of(id)
    }

    /// The instance known to be stored under `key`.
    pub fn lookup(&self, key: &Key) -> Option<EntityId> {
        self.identity.lookup(key)
    }

    /// Last tuple the store acknowledged for a persisted entity.
    pub fn original(&self, id: EntityId) -> Option<&Tuple> {
        if !self.identity.is_persisted(id) {
            return None;
        }
        self.identity.snapshot(self.identity.key_of(id)?)
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }

    pub fn flush_cache(&mut self) {
        self.cache.clear();
    }

    /// Detaches the stored instance for `key` without touching the store.
    pub fn forget(&mut self, key: &Key) -> Option<Entity> {
        let forgotten = self.identity.forget(key);
        if forgotten.is_some() {
            self.cache.clear();
        }
        forgotten
    }

    /// Instantiates an unsaved entity from named or positional data.
    ///
    /// Positional values are assigned to the only format field of a matching
    /// type (numbers to the single unsigned field, text to the single string
    /// field, arrays to the single `*` field); other values are dropped.
    pub fn create(&mut self, data: impl Into<Params>) -> Result<EntityId> {
        let space = self.space.clone();
        let span = info_span!("mapper.create", space = %space.name());
        let _enter = span.enter();

        let class = self.plugins.entity_class(&space)?;
        let mut entity = Entity::with_class(class);

        for (name, value) in assign_fields(&space, data.into()) {
            if space.get_field(&name).is_some() {
                entity.set(name, value);
            }
        }

        self.plugins.instantiate(&mut entity, &space, true)?;
        let key = keys::key_of_entity(&space, &entity)?;
        let id = self.identity.adopt(entity, key)?;

        event!(Level::DEBUG, entity = %id, "entity instantiated");
        Ok(id)
    }

    /// Inserts a new entity or sends the changed fields of a persisted one.
    pub fn save(&mut self, id: EntityId) -> Result<()> {
        if !self.identity.knows(id) {
            return Err(MapperError::EntityNotFound(id));
        }

        let span = info_span!("mapper.save", space = %self.space.name(), entity = %id);
        let _enter = span.enter();

        if self.identity.is_persisted(id) {
            self.update_entity(id)
        } else {
            self.insert_entity(id)
        }
    }

    fn insert_entity(&mut self, id: EntityId) -> Result<()> {
        let space = self.space.clone();

        let entity = self.identity.entity_mut(id)?;
        diff::complete_fields(&space, entity);
        self.plugins.dispatch(Hook::BeforeCreate, entity, &space)?;
        let tuple = diff::build_tuple(&space, entity)?;

        // Hooks may have set the key, so the claim is checked again here.
        let key = keys::key_of_tuple(&space, &tuple)?;
        self.identity.rekey(id, key.clone())?;

        let stored = self.client.insert(space.id(), tuple)?;
        self.identity.register(key.clone(), id, space.coerce_tuple(&stored)?)?;
        event!(Level::DEBUG, key = %key, "entity inserted");

        let entity = self.identity.entity_mut(id)?;
        self.plugins.dispatch(Hook::AfterCreate, entity, &space)?;

        self.cache.clear();
        Ok(())
    }

    fn update_entity(&mut self, id: EntityId) -> Result<()> {
        let space = self.space.clone();
        let key = self
            .identity
            .key_of(id)
            .cloned()
            .ok_or(MapperError::EntityNotFound(id))?;
        let original = self
            .identity
            .snapshot(&key)
            .cloned()
            .ok_or(MapperError::EntityNotFound(id))?;

        let entity = self.identity.entity_mut(id)?;
        let tuple = diff::build_tuple(&space, entity)?;
        if diff::diff(&original, &tuple).is_empty() {
            event!(Level::DEBUG, "nothing to save");
            return Ok(());
        }

        // Hooks may change fields, so the payload is computed after them.
        self.plugins.dispatch(Hook::BeforeUpdate, entity, &space)?;
        let tuple = diff::build_tuple(&space, entity)?;
        let operations = diff::diff(&original, &tuple);
        if operations.is_empty() {
            event!(Level::DEBUG, "hooks reverted every change");
            return Ok(());
        }

        let primary = diff::primary_values(&space, &original)?;
        self.client.update(space.id(), &primary, &operations)?;
        self.identity.set_snapshot(&key, tuple);
        event!(Level::DEBUG, key = %key, fields = operations.len(), "entity updated");

        let entity = self.identity.entity_mut(id)?;
        self.plugins.dispatch(Hook::AfterUpdate, entity, &space)?;

        self.cache.clear();
        Ok(())
    }

    /// Sends named update operations for a persisted entity and takes the
    /// tuple the store returns as the new state of both entity and snapshot.
    pub fn apply_operations(&mut self, id: EntityId, operations: &[(Operator, &str, Value)]) -> Result<()> {
        if operations.is_empty() {
            return Ok(());
        }
        let space = self.space.clone();
        let span = info_span!("mapper.apply", space = %space.name(), entity = %id);
        let _enter = span.enter();

        if !self.identity.is_persisted(id) {
            return Err(MapperError::UnsupportedOperation(format!(
                "entity {} of '{}' is not persisted",
                id,
                space.name()
            )));
        }

        let mut wire = Vec::with_capacity(operations.len());
        for (operator, field, value) in operations {
            wire.push(UpdateOp {
                operator: *operator,
                field: space.field_position(field)?,
                value: value.clone(),
            });
        }

        let key = self
            .identity
            .key_of(id)
            .cloned()
            .ok_or(MapperError::EntityNotFound(id))?;
        let original = self
            .identity
            .snapshot(&key)
            .ok_or(MapperError::EntityNotFound(id))?;
        let primary = diff::primary_values(&space, original)?;

        let returned = self.client.update(space.id(), &primary, &wire)?;
        self.cache.clear();

        let Some(tuple) = returned.into_iter().next() else {
            event!(Level::WARN, key = %key, "update matched no stored tuple");
            return Ok(());
        };
        let tuple = space.coerce_tuple(&tuple)?;
        diff::hydrate_fields(&space, self.identity.entity_mut(id)?, &tuple);
        self.identity.set_snapshot(&key, tuple);
        Ok(())
    }

    /// Deletes a persisted entity and drops it from the repository.
    ///
    /// Returns the removed entity, or `None` when it was never saved (nothing
    /// is sent in that case).
    pub fn remove(&mut self, id: EntityId) -> Result<Option<Entity>> {
        if !self.identity.knows(id) {
            return Err(MapperError::EntityNotFound(id));
        }
        if !self.identity.is_persisted(id) {
            return Ok(None);
        }

        let space = self.space.clone();
        let span = info_span!("mapper.remove", space = %space.name(), entity = %id);
        let _enter = span.enter();

        let key = self
            .identity
            .key_of(id)
            .cloned()
            .ok_or(MapperError::EntityNotFound(id))?;
        let original = self
            .identity
            .snapshot(&key)
            .ok_or(MapperError::EntityNotFound(id))?;
        let primary = diff::primary_values(&space, original)?;

        let entity = self.identity.entity_mut(id)?;
        self.plugins.dispatch(Hook::BeforeRemove, entity, &space)?;

        let deleted = self.client.delete(space.id(), &primary)?;
        if deleted.is_empty() {
            event!(Level::WARN, key = %key, "store no longer held the removed record");
        }

        let entity = self.identity.entity_mut(id)?;
        self.plugins.dispatch(Hook::AfterRemove, entity, &space)?;

        let removed = self.identity.forget(&key);
        self.cache.clear();
        event!(Level::DEBUG, key = %key, "entity removed");
        Ok(removed)
    }

    /// Removes every entity matching a non-empty filter; returns how many.
    pub fn remove_by(&mut self, params: impl Into<Params>) -> Result<usize> {
        let params = params.into();
        if params.is_empty() {
            return Err(MapperError::UseTruncate {
                space: self.space.name().to_string(),
            });
        }

        let matches = self.find(params)?;
        let mut removed = 0;
        for id in matches {
            if self.remove(id)?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Drops an unsaved entity. Persisted entities are left alone.
    pub fn discard(&mut self, id: EntityId) -> Option<Entity> {
        self.identity.release(id)
    }

    /// Empties the space on the store.
    ///
    /// Instances already handed out stay in the identity map; saving one of
    /// them afterwards updates a record that no longer exists.
    pub fn truncate(&mut self) -> Result<()> {
        let span = info_span!("mapper.truncate", space = %self.space.name());
        let _enter = span.enter();

        self.cache.clear();
        self.client.truncate(self.space.id())?;
        event!(Level::DEBUG, held = self.identity.len(), "space truncated");
        Ok(())
    }

    /// Reloads a known record from the store, overwriting both the entity's
    /// fields and its snapshot; limited to `fields` when given.
    pub fn sync(&mut self, key: impl Into<Key>, fields: Option<&[&str]>) -> Result<()> {
        let key = key.into();
        let Some(id) = self.identity.lookup(&key) else {
            return Ok(());
        };

        let space = self.space.clone();
        let span = info_span!("mapper.sync", space = %space.name(), key = %key);
        let _enter = span.enter();

        let primary = space.primary_index()?;
        let tuple = self
            .client
            .select(space.id(), primary.id, key.parts(), Default::default())?
            .into_iter()
            .next()
            .ok_or_else(|| MapperError::NotFound {
                space: space.name().to_string(),
                params: key.to_string(),
            })?;
        let tuple = space.coerce_tuple(&tuple)?;

        let selected: Vec<(usize, &str)> = space
            .format()
            .iter()
            .enumerate()
            .filter(|(_, field)| fields.is_none_or(|names| names.contains(&field.name.as_str())))
            .map(|(position, field)| (position, field.name.as_str()))
            .collect();

        let entity = self.identity.entity_mut(id)?;
        for (position, name) in &selected {
            entity.set(*name, tuple.get(*position).cloned().unwrap_or(Value::Null));
        }

        if let Some(snapshot) = self.identity.snapshot_mut(&key) {
            for (position, _) in selected {
                if snapshot.len() <= position {
                    snapshot.resize(position + 1, Value::Null);
                }
                snapshot[position] = tuple.get(position).cloned().unwrap_or(Value::Null);
            }
        }
        Ok(())
    }

    /// Wraps a stored tuple into the instance known for its key, creating
    /// and registering one if the key is new.
    fn hydrate(&mut self, tuple: Tuple) -> Result<EntityId> {
        let space = self.space.clone();
        // Stored values are read back in the format's types so that an
        // untouched entity rebuilds exactly its snapshot.
        let tuple = space.coerce_tuple(&tuple)?;
        let key = keys::key_of_tuple(&space, &tuple)?;
        if let Some(known) = self.identity.lookup(&key) {
            return Ok(known);
        }

        let class = self.plugins.entity_class(&space)?;
        let mut entity = Entity::with_class(class);
        diff::hydrate_fields(&space, &mut entity, &tuple);
        self.plugins.instantiate(&mut entity, &space, false)?;

        self.identity.hydrate(entity, key, tuple)
    }
}

fn assign_fields(space: &Space, data: Params) -> Vec<(String, Value)> {
    let positional = match data {
        Params::Fields(fields) => return fields,
        Params::Scalar(value) => vec![value],
        Params::List(values) => values,
    };

    positional
        .into_iter()
        .filter_map(|value| {
            let kind = value.kind();
            if kind == ValueKind::Null {
                return None;
            }
            let mut candidates = space.format().iter().filter(|f| f.data_type.accepts_kind(kind));
            match (candidates.next(), candidates.next()) {
                (Some(only), None) => Some((only.name.clone(), value)),
                _ => None,
            }
        })
        .collect()
}
