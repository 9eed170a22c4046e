use tracing::{Level, event, info_span};

use super::{Found, Repository, diff, keys};
use crate::client::IteratorType;
use crate::core::{MapperError, Params, Result};
use crate::entity::EntityId;
use crate::plugins::Hook;
use crate::schema::IndexKind;

impl Repository {
    /// Every entity matching `params`, served from the query cache when the
    /// same call was answered since the last mutation.
    pub fn find(&mut self, params: impl Into<Params>) -> Result<Vec<EntityId>> {
        match self.lookup_signature(false, params.into())? {
            Found::Many(ids) => Ok(ids),
            Found::One(id) => Ok(id.into_iter().collect()),
        }
    }

    pub fn find_one(&mut self, params: impl Into<Params>) -> Result<Option<EntityId>> {
        match self.lookup_signature(true, params.into())? {
            Found::One(id) => Ok(id),
            Found::Many(ids) => Ok(ids.into_iter().next()),
        }
    }

    pub fn find_or_fail(&mut self, params: impl Into<Params>) -> Result<EntityId> {
        let params = params.into();
        self.find_one(params.clone())?
            .ok_or_else(|| MapperError::NotFound {
                space: self.space.name().to_string(),
                params: params.to_string(),
            })
    }

    /// Finds the entity matching `params` or creates and saves one.
    ///
    /// Creation goes through the find-or-create procedure when one is
    /// configured, so concurrent callers insert at most once. Create hooks
    /// run here only for the caller whose procedure call inserted.
    pub fn find_or_create(&mut self, params: impl Into<Params>) -> Result<EntityId> {
        let params = params.into();
        let space = self.space.clone();
        let span = info_span!("mapper.find_or_create", space = %space.name(), params = %params);
        let _enter = span.enter();

        if let Some(procedure) = self.procedure.clone()
            && !space.is_system()
        {
            let outcome = procedure.execute(&space, &keys::normalize(&space, params.clone()))?;
            if outcome.created {
                event!(Level::DEBUG, key = %outcome.key, "record created by procedure");
                self.cache.clear();
                let id = self.find_or_fail(outcome.key)?;
                self.replay_create_hooks(id)?;
                self.cache.clear();
                // Answered by the same lookup a hit gets; hooks may have moved
                // the record out of the filter, then the created one is kept.
                return Ok(self.find_one(params)?.unwrap_or(id));
            }
        }

        if let Some(found) = self.find_one(params.clone())? {
            return Ok(found);
        }

        event!(Level::DEBUG, "creating locally");
        let id = self.create(params)?;
        self.save(id)?;
        Ok(id)
    }

    /// Runs create hooks on a record inserted by the procedure and stores
    /// whatever they changed.
    fn replay_create_hooks(&mut self, id: EntityId) -> Result<()> {
        let space = self.space.clone();

        let entity = self.identity.entity_mut(id)?;
        self.plugins.dispatch(Hook::BeforeCreate, entity, &space)?;
        let tuple = diff::build_tuple(&space, entity)?;

        let key = self
            .identity
            .key_of(id)
            .cloned()
            .ok_or(MapperError::EntityNotFound(id))?;
        let original = self
            .identity
            .snapshot(&key)
            .ok_or(MapperError::EntityNotFound(id))?;

        let operations = diff::diff(original, &tuple);
        if !operations.is_empty() {
            let primary = diff::primary_values(&space, original)?;
            self.client.update(space.id(), &primary, &operations)?;
            self.identity.set_snapshot(&key, tuple);
        }

        let entity = self.identity.entity_mut(id)?;
        self.plugins.dispatch(Hook::AfterCreate, entity, &space)
    }

    fn lookup_signature(&mut self, one: bool, params: Params) -> Result<Found> {
        let span = info_span!("mapper.find", space = %self.space.name(), one, params = %params);
        let _enter = span.enter();

        let signature = (one, params);
        if let Some(found) = self.cache.get(&signature) {
            event!(Level::DEBUG, "query cache hit");
            return Ok(found);
        }
        event!(Level::DEBUG, "query cache miss");

        let (one, params) = signature;
        let found = self.select(one, &params)?;
        self.cache.put((one, params), found.clone());
        Ok(found)
    }

    fn select(&mut self, one: bool, params: &Params) -> Result<Found> {
        let space = self.space.clone();
        let normalized = keys::normalize(&space, params.clone());
        let index = space
            .resolve_index(&normalized)?
            .ok_or_else(|| MapperError::NoIndexForParams {
                space: space.name().to_string(),
                params: params.to_string(),
            })?;
        let values = space.index_values(index, &normalized)?;

        let iterator = if values.is_empty() && index.kind == IndexKind::Hash {
            IteratorType::All
        } else {
            IteratorType::Eq
        };
        let tuples = self.client.select(space.id(), index.id, &values, iterator)?;
        event!(Level::DEBUG, index = %index.name, rows = tuples.len(), "selected");

        let mut ids = Vec::with_capacity(if one { 1 } else { tuples.len() });
        for tuple in tuples {
            ids.push(self.hydrate(tuple)?);
            if one {
                break;
            }
        }

        Ok(if one {
            Found::One(ids.into_iter().next())
        } else {
            Found::Many(ids)
        })
    }
}
