use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{DataType, Key, MapperError, Params, Result, Tuple, Value};

/// One entry of a space format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, rename = "is_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Hash,
    Tree,
    Bitset,
    Rtree,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash => write!(f, "hash"),
            Self::Tree => write!(f, "tree"),
            Self::Bitset => write!(f, "bitset"),
            Self::Rtree => write!(f, "rtree"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexPart {
    /// Position of the indexed field in the format.
    pub field: usize,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub id: u32,
    pub name: String,
    pub kind: IndexKind,
    pub unique: bool,
    pub parts: Vec<IndexPart>,
}

impl Index {
    pub fn is_primary(&self) -> bool {
        self.id == 0
    }

    /// Extracts this index's values from a tuple, in part order.
    pub fn key_of_tuple(&self, tuple: &[Value]) -> Key {
        Key::new(
            self.parts
                .iter()
                .map(|part| tuple.get(part.field).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// True when the leading parts of `tuple` equal `values`.
    pub fn matches_prefix(&self, tuple: &[Value], values: &[Value]) -> bool {
        self.parts
            .iter()
            .zip(values)
            .all(|(part, value)| tuple.get(part.field).unwrap_or(&Value::Null) == value)
    }
}

/// Index description by field names, resolved against a format when added to a space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    #[serde(default)]
    pub id: Option<u32>,
    pub name: String,
    #[serde(default = "default_index_kind", rename = "type")]
    pub kind: IndexKind,
    #[serde(default)]
    pub unique: Option<bool>,
    pub parts: Vec<String>,
}

fn default_index_kind() -> IndexKind {
    IndexKind::Tree
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, parts: &[&str]) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind: IndexKind::Tree,
            unique: None,
            parts: parts.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn kind(mut self, kind: IndexKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }
}

/// Serializable description of a whole space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceDefinition {
    pub id: u32,
    pub name: String,
    pub format: Vec<Field>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

/// Metadata of one collection: its format and its indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct Space {
    id: u32,
    name: String,
    format: Vec<Field>,
    indexes: Vec<Index>,
}

impl Space {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            format: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn from_definition(definition: SpaceDefinition) -> Result<Self> {
        let mut space = Self::new(definition.id, definition.name);
        space.format = definition.format;
        for index in definition.indexes {
            space = space.with_index(index)?;
        }
        Ok(space)
    }

    pub fn field(mut self, field: Field) -> Self {
        self.format.push(field);
        self
    }

    /// Adds an index. The first index added becomes the primary one and is
    /// unique unless stated otherwise.
    pub fn with_index(mut self, definition: IndexDefinition) -> Result<Self> {
        let id = definition.id.unwrap_or(self.indexes.len() as u32);
        if self.indexes.iter().any(|i| i.id == id || i.name == definition.name) {
            return Err(MapperError::Config(format!(
                "Index '{}' ({}) already defined on '{}'",
                definition.name, id, self.name
            )));
        }

        let mut parts = Vec::with_capacity(definition.parts.len());
        for name in &definition.parts {
            let field = self.field_position(name)?;
            parts.push(IndexPart {
                field,
                data_type: self.format[field].data_type,
            });
        }

        self.indexes.push(Index {
            id,
            name: definition.name,
            kind: definition.kind,
            unique: definition.unique.unwrap_or(id == 0),
            parts,
        });
        self.indexes.sort_by_key(|i| i.id);
        Ok(self)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &[Field] {
        &self.format
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Metadata collections are named with a leading underscore.
    pub fn is_system(&self) -> bool {
        self.name.starts_with('_')
    }

    pub fn field_position(&self, name: &str) -> Result<usize> {
        self.format
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| MapperError::FieldNotFound {
                space: self.name.clone(),
                field: name.to_string(),
            })
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.format.iter().find(|f| f.name == name)
    }

    pub fn primary_index(&self) -> Result<&Index> {
        self.indexes
            .iter()
            .find(|i| i.is_primary())
            .ok_or_else(|| MapperError::NoPrimaryIndex {
                space: self.name.clone(),
            })
    }

    pub fn index(&self, id: u32) -> Option<&Index> {
        self.indexes.iter().find(|i| i.id == id)
    }

    pub fn index_by_name(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn tuple_key(&self, tuple: &[Value]) -> Result<Key> {
        Ok(self.primary_index()?.key_of_tuple(tuple))
    }

    /// Picks an index able to serve `params`.
    ///
    /// An index whose parts are exactly the named fields wins; otherwise the
    /// first index whose leading parts cover all named fields. Positional
    /// params address the primary index. A field outside the format matches
    /// no index.
    pub fn resolve_index(&self, params: &Params) -> Result<Option<&Index>> {
        let fields = match params {
            Params::Scalar(_) => return Ok(self.primary_index().ok()),
            Params::List(values) => {
                return Ok(self
                    .primary_index()
                    .ok()
                    .filter(|primary| values.len() <= primary.parts.len()));
            }
            Params::Fields(fields) => fields,
        };

        let mut positions = Vec::with_capacity(fields.len());
        for (name, _) in fields {
            let Some(position) = self.format.iter().position(|field| field.name == *name) else {
                return Ok(None);
            };
            if !positions.contains(&position) {
                positions.push(position);
            }
        }

        let exact = self.indexes.iter().find(|index| {
            index.parts.len() == positions.len()
                && index.parts.iter().all(|part| positions.contains(&part.field))
        });
        if exact.is_some() {
            return Ok(exact);
        }

        Ok(self.indexes.iter().find(|index| {
            let covered = index
                .parts
                .iter()
                .take_while(|part| positions.contains(&part.field))
                .count();
            covered == positions.len()
        }))
    }

    /// Coerced lookup values for `index`, in part order, stopping at the
    /// first part `params` does not provide.
    pub fn index_values(&self, index: &Index, params: &Params) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(index.parts.len());
        match params {
            Params::Scalar(value) => {
                if let Some(part) = index.parts.first() {
                    values.push(part.data_type.coerce(value)?);
                }
            }
            Params::List(list) => {
                for (part, value) in index.parts.iter().zip(list) {
                    values.push(part.data_type.coerce(value)?);
                }
            }
            Params::Fields(_) => {
                for part in &index.parts {
                    let name = &self.format[part.field].name;
                    let Some(value) = params.get(name) else {
                        break;
                    };
                    values.push(part.data_type.coerce(value)?);
                }
            }
        }
        Ok(values)
    }

    /// Coerces every position of a tuple against the format.
    pub fn coerce_tuple(&self, tuple: &[Value]) -> Result<Tuple> {
        self.format
            .iter()
            .enumerate()
            .map(|(i, field)| field.data_type.coerce(tuple.get(i).unwrap_or(&Value::Null)))
            .collect()
    }
}
