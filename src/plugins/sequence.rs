use std::sync::Arc;

use tracing::debug;

use super::Plugin;
use crate::client::StorageClient;
use crate::core::{DataType, Result, Value};
use crate::entity::Entity;
use crate::schema::Space;

/// Assigns primary keys from a store-side counter named after the space.
///
/// Only single-part unsigned or integer primary keys are generated, and only
/// when the entity has no key yet (unset, `null` or `0`).
pub struct SequencePlugin {
    client: Arc<dyn StorageClient>,
}

impl SequencePlugin {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self { client }
    }
}

impl Plugin for SequencePlugin {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn generate_key(&self, entity: &mut Entity, space: &Space) -> Result<()> {
        let Ok(primary) = space.primary_index() else {
            return Ok(());
        };
        let [part] = primary.parts.as_slice() else {
            return Ok(());
        };

        let field = &space.format()[part.field].name;
        let missing = matches!(
            entity.get(field),
            Value::Null | Value::Unsigned(0) | Value::Integer(0)
        );
        if !missing {
            return Ok(());
        }

        let next = match part.data_type {
            DataType::Unsigned => Value::Unsigned(self.client.sequence_next(space.name())?),
            DataType::Integer => Value::Integer(self.client.sequence_next(space.name())? as i64),
            _ => return Ok(()),
        };
        debug!(space = space.name(), key = %next, "generated key");
        entity.set(field.clone(), next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryClient;
    use crate::schema::{Field, IndexDefinition, Schema};

    fn setup() -> (Space, SequencePlugin) {
        let space = Space::new(700, "task")
            .field(Field::new("id", DataType::Unsigned))
            .field(Field::new("title", DataType::String))
            .with_index(IndexDefinition::new("primary", &["id"]))
            .unwrap();
        let schema = Arc::new(Schema::new().with_space(space.clone()).unwrap());
        let client = Arc::new(InMemoryClient::new(schema));
        (space, SequencePlugin::new(client))
    }

    #[test]
    fn test_assigns_increasing_keys() {
        let (space, plugin) = setup();
        let mut first = Entity::new();
        let mut second = Entity::new();
        second.set("id", 0u64);

        plugin.generate_key(&mut first, &space).unwrap();
        plugin.generate_key(&mut second, &space).unwrap();

        assert_eq!(first.get("id"), &Value::Unsigned(1));
        assert_eq!(second.get("id"), &Value::Unsigned(2));
    }

    #[test]
    fn test_keeps_explicit_key() {
        let (space, plugin) = setup();
        let mut entity = Entity::new();
        entity.set("id", 42u64);
        plugin.generate_key(&mut entity, &space).unwrap();
        assert_eq!(entity.get("id"), &Value::Unsigned(42));
    }
}
