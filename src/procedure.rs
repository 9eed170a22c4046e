use std::sync::Arc;

use crate::client::{IteratorType, StorageClient};
use crate::core::{Key, MapperError, Params, Result};
use crate::entity::Entity;
use crate::plugins::{Plugin, SequencePlugin};
use crate::repository::diff;
use crate::schema::Space;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOrCreateOutcome {
    /// True when this call inserted the record.
    pub created: bool,
    /// Key of the found or inserted record.
    pub key: Key,
}

/// Store-side existence check and insert, run as one step.
///
/// Receives normalized params. Implementations must guarantee that
/// concurrent calls with equal params insert at most once.
pub trait FindOrCreateProcedure: Send + Sync {
    fn execute(&self, space: &Space, params: &Params) -> Result<FindOrCreateOutcome>;
}

/// Find-or-create on top of [`StorageClient::find_or_insert`].
///
/// The candidate tuple is built from the params with the same defaults and
/// coercion a repository save uses; a missing numeric primary key is taken
/// from the space's sequence.
pub struct StorageFindOrCreate {
    client: Arc<dyn StorageClient>,
    keys: SequencePlugin,
}

impl StorageFindOrCreate {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self {
            keys: SequencePlugin::new(client.clone()),
            client,
        }
    }
}

impl FindOrCreateProcedure for StorageFindOrCreate {
    fn execute(&self, space: &Space, params: &Params) -> Result<FindOrCreateOutcome> {
        let index = space
            .resolve_index(params)?
            .ok_or_else(|| MapperError::NoIndexForParams {
                space: space.name().to_string(),
                params: params.to_string(),
            })?;
        let values = space.index_values(index, params)?;

        // A hit never draws from the sequence. Only a racing insert between
        // this select and the one below can still leave a gap.
        let iterator = if values.is_empty() {
            IteratorType::All
        } else {
            IteratorType::Eq
        };
        if let Some(found) = self
            .client
            .select(space.id(), index.id, &values, iterator)?
            .into_iter()
            .next()
        {
            return Ok(FindOrCreateOutcome {
                created: false,
                key: space.tuple_key(&space.coerce_tuple(&found)?)?,
            });
        }

        let mut entity = Entity::new();
        match params {
            Params::Fields(fields) => {
                for (name, value) in fields {
                    if space.get_field(name).is_some() {
                        entity.set(name.clone(), value.clone());
                    }
                }
            }
            Params::Scalar(_) | Params::List(_) => {
                for (part, value) in index.parts.iter().zip(&values) {
                    entity.set(space.format()[part.field].name.clone(), value.clone());
                }
            }
        }

        self.keys.generate_key(&mut entity, space)?;
        let tuple = diff::build_tuple(space, &mut entity)?;
        let (created, stored) = self
            .client
            .find_or_insert(space.id(), index.id, &values, tuple)?;

        Ok(FindOrCreateOutcome {
            created,
            key: space.tuple_key(&space.coerce_tuple(&stored)?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryClient;
    use crate::core::{DataType, Value};
    use crate::schema::{Field, IndexDefinition, Schema};

    fn setup() -> (Space, Arc<InMemoryClient>) {
        let space = Space::new(800, "tag")
            .field(Field::new("id", DataType::Unsigned))
            .field(Field::new("label", DataType::String))
            .with_index(IndexDefinition::new("primary", &["id"]))
            .unwrap()
            .with_index(IndexDefinition::new("label", &["label"]).unique(true))
            .unwrap();
        let schema = Arc::new(Schema::new().with_space(space.clone()).unwrap());
        (space, Arc::new(InMemoryClient::new(schema)))
    }

    #[test]
    fn test_creates_then_finds() {
        let (space, client) = setup();
        let procedure = StorageFindOrCreate::new(client.clone());
        let params = Params::by("label", "rust");

        let first = procedure.execute(&space, &params).unwrap();
        assert!(first.created);
        assert_eq!(first.key, Key::from(1u64));

        let second = procedure.execute(&space, &params).unwrap();
        assert!(!second.created);
        assert_eq!(second.key, first.key);

        assert_eq!(
            client.tuples(800).unwrap(),
            vec![vec![Value::Unsigned(1), Value::from("rust")]]
        );
    }

    #[test]
    fn test_repeated_hits_keep_the_sequence() {
        let (space, client) = setup();
        let procedure = StorageFindOrCreate::new(client.clone());
        let params = Params::by("label", "rust");

        for _ in 0..5 {
            procedure.execute(&space, &params).unwrap();
        }
        assert_eq!(client.sequence_next("tag").unwrap(), 2);
        assert_eq!(client.stats().inserts, 1);
    }

    #[test]
    fn test_unservable_params() {
        let (space, client) = setup();
        let procedure = StorageFindOrCreate::new(client);
        let params = Params::by("label", "a").and("id", 1u64);
        assert!(matches!(
            procedure.execute(&space, &params),
            Err(MapperError::NoIndexForParams { .. })
        ));
    }
}
