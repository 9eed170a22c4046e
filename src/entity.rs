use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{Result, Value};

/// Handle to an entity held by a repository.
///
/// Handles are compared by identity: two handles are equal only when they
/// were issued for the same instance, whatever the field values are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle methods an entity type may provide for its own instances.
///
/// Provided by plugins through [`crate::plugins::Plugin::entity_class`];
/// they run once after every plugin has seen the same event.
pub trait EntityClass: Send + Sync {
    fn name(&self) -> &str;

    fn before_create(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }

    fn after_create(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }

    fn before_update(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }

    fn after_update(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }

    fn before_remove(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }

    fn after_remove(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
}

/// Named field values of one record.
#[derive(Clone, Default)]
pub struct Entity {
    fields: BTreeMap<String, Value>,
    class: Option<Arc<dyn EntityClass>>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_class(class: Option<Arc<dyn EntityClass>>) -> Self {
        Self {
            fields: BTreeMap::new(),
            class,
        }
    }

    /// Value of a field; unset fields read as `Null`.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn class(&self) -> Option<&Arc<dyn EntityClass>> {
        self.class.as_ref()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Entity");
        if let Some(class) = &self.class {
            debug.field("class", &class.name());
        }
        debug.field("fields", &self.fields).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Post;

    impl EntityClass for Post {
        fn name(&self) -> &str {
            "Post"
        }
    }

    #[test]
    fn test_unset_fields_read_as_null() {
        let mut entity = Entity::new();
        assert!(entity.get("name").is_null());
        entity.set("name", "a");
        assert_eq!(entity.get("name"), &Value::from("a"));
        assert_eq!(entity.unset("name"), Some(Value::from("a")));
        assert!(!entity.has("name"));
    }

    #[test]
    fn test_debug_hides_class_object() {
        let mut entity = Entity::with_class(Some(Arc::new(Post)));
        entity.set("id", 1u64);
        let rendered = format!("{:?}", entity);
        assert!(rendered.contains("\"Post\""));
        assert!(rendered.contains("Unsigned(1)"));
    }
}
