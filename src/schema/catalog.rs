use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Space, SpaceDefinition};
use crate::core::{MapperError, Result};

/// Source of space metadata consumed by repositories.
pub trait MetadataProvider: Send + Sync {
    /// Looks a space up by name.
    fn space(&self, name: &str) -> Result<Arc<Space>>;

    /// Looks a space up by its numeric id.
    fn space_by_id(&self, id: u32) -> Result<Arc<Space>>;

    fn has_space(&self, name: &str) -> bool {
        self.space(name).is_ok()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub spaces: Vec<SpaceDefinition>,
}

/// In-process catalog of spaces with id and name lookups.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    spaces: HashMap<String, Arc<Space>>,
    names: HashMap<u32, String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definition(definition: SchemaDefinition) -> Result<Self> {
        let mut schema = Self::new();
        for space in definition.spaces {
            schema = schema.with_space(Space::from_definition(space)?)?;
        }
        Ok(schema)
    }

    /// Parses a JSON document of the form `{"spaces": [...]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: SchemaDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| MapperError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn with_space(mut self, space: Space) -> Result<Self> {
        if self.spaces.contains_key(space.name()) {
            return Err(MapperError::SpaceExists(space.name().to_string()));
        }
        if let Some(existing) = self.names.get(&space.id()) {
            return Err(MapperError::SpaceExists(format!(
                "{} (id {} is taken by '{}')",
                space.name(),
                space.id(),
                existing
            )));
        }

        self.names.insert(space.id(), space.name().to_string());
        self.spaces.insert(space.name().to_string(), Arc::new(space));
        Ok(self)
    }

    pub fn space_id(&self, name: &str) -> Option<u32> {
        self.spaces.get(name).map(|s| s.id())
    }

    pub fn space_name(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn index_id(&self, space: &str, index: &str) -> Option<u32> {
        self.spaces.get(space)?.index_by_name(index).map(|i| i.id)
    }

    pub fn has_index(&self, space: &str, index: &str) -> bool {
        self.index_id(space, index).is_some()
    }

    /// Index names of a space mapped to the names of their fields.
    pub fn list_indexes(&self, space: &str) -> Result<HashMap<String, Vec<String>>> {
        let space = self.space(space)?;
        Ok(space
            .indexes()
            .iter()
            .map(|index| {
                let fields = index
                    .parts
                    .iter()
                    .map(|part| space.format()[part.field].name.clone())
                    .collect();
                (index.name.clone(), fields)
            })
            .collect())
    }

    pub fn list_spaces(&self) -> Vec<&str> {
        self.spaces.keys().map(String::as_str).collect()
    }
}

impl MetadataProvider for Schema {
    fn space(&self, name: &str) -> Result<Arc<Space>> {
        self.spaces
            .get(name)
            .cloned()
            .ok_or_else(|| MapperError::SpaceNotFound(name.to_string()))
    }

    fn space_by_id(&self, id: u32) -> Result<Arc<Space>> {
        let name = self
            .names
            .get(&id)
            .ok_or_else(|| MapperError::SpaceNotFound(format!("#{}", id)))?;
        self.space(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Value};
    use crate::schema::IndexKind;

    const DEFINITION: &str = r#"{
        "spaces": [{
            "id": 512,
            "name": "post",
            "format": [
                {"name": "id", "type": "unsigned"},
                {"name": "title", "type": "string", "default": "untitled"},
                {"name": "tags", "type": "*", "is_nullable": true}
            ],
            "indexes": [
                {"name": "primary", "type": "hash", "parts": ["id"]},
                {"name": "title", "parts": ["title"]}
            ]
        }]
    }"#;

    #[test]
    fn test_from_json() {
        let schema = Schema::from_json(DEFINITION).unwrap();
        let post = schema.space("post").unwrap();

        assert_eq!(post.id(), 512);
        assert_eq!(post.format()[0].data_type, DataType::Unsigned);
        assert_eq!(post.format()[1].default, Some(Value::from("untitled")));
        assert!(post.format()[2].nullable);
        assert_eq!(post.primary_index().unwrap().kind, IndexKind::Hash);
        assert_eq!(schema.index_id("post", "title"), Some(1));
    }

    #[test]
    fn test_id_name_resolution() {
        let schema = Schema::from_json(DEFINITION).unwrap();
        assert_eq!(schema.space_id("post"), Some(512));
        assert_eq!(schema.space_name(512), Some("post"));
        assert_eq!(schema.space_by_id(512).unwrap().name(), "post");
        assert!(schema.space_by_id(1).is_err());
        assert!(!schema.has_space("comment"));
    }

    #[test]
    fn test_list_indexes() {
        let schema = Schema::from_json(DEFINITION).unwrap();
        let indexes = schema.list_indexes("post").unwrap();
        assert_eq!(indexes["primary"], vec!["id".to_string()]);
        assert_eq!(indexes["title"], vec!["title".to_string()]);
    }

    #[test]
    fn test_duplicate_space_rejected() {
        let schema = Schema::new().with_space(Space::new(1, "a")).unwrap();
        assert!(matches!(
            schema.clone().with_space(Space::new(2, "a")),
            Err(MapperError::SpaceExists(_))
        ));
        assert!(schema.with_space(Space::new(1, "b")).is_err());
    }
}
