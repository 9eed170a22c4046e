pub mod catalog;
pub mod space;

pub use catalog::{MetadataProvider, Schema, SchemaDefinition};
pub use space::{Field, Index, IndexDefinition, IndexKind, IndexPart, Space, SpaceDefinition};
