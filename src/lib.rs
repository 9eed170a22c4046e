// ============================================================================
// TupleMapper Library
// ============================================================================

//! Maps entities onto tuples of a positional tuple store.
//!
//! Each space gets a [`Repository`] that keeps one instance per stored
//! record, remembers what the store last acknowledged and sends only the
//! changed fields on save.
//!
//! ```
//! use std::sync::Arc;
//! use tuplemapper::{DataType, Field, IndexDefinition, InMemoryClient, Mapper, Params, Schema, SequencePlugin, Space, Value};
//!
//! # fn main() -> tuplemapper::Result<()> {
//! let schema = Arc::new(Schema::new().with_space(
//!     Space::new(512, "user")
//!         .field(Field::new("id", DataType::Unsigned))
//!         .field(Field::new("name", DataType::String))
//!         .with_index(IndexDefinition::new("primary", &["id"]))?,
//! )?);
//! let client = Arc::new(InMemoryClient::new(schema.clone()));
//!
//! let mut mapper = Mapper::new(client.clone(), schema);
//! mapper.add_plugin(SequencePlugin::new(client))?;
//!
//! let user = mapper.create("user", Params::by("name", "Alice"))?;
//! assert_eq!(user.get("id").as_u64(), Some(1));
//!
//! let found = mapper.find_one("user", 1u64)?;
//! assert_eq!(found.map(|u| u.get("name").clone()), Some(Value::from("Alice")));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod entity;
pub mod facade;
pub mod plugins;
pub mod procedure;
pub mod repository;
pub mod schema;

// Re-export main types for convenience
pub use client::{ClientStats, InMemoryClient, IteratorType, Operator, StorageClient, UpdateOp};
pub use config::MapperConfig;
pub use core::{DataType, Key, MapperError, Params, Result, Tuple, Value, ValueKind};
pub use entity::{Entity, EntityClass, EntityId};
pub use facade::Mapper;
pub use plugins::{Hook, Plugin, PluginRegistry, SequencePlugin};
pub use procedure::{FindOrCreateOutcome, FindOrCreateProcedure, StorageFindOrCreate};
pub use repository::Repository;
pub use schema::{Field, Index, IndexDefinition, IndexKind, MetadataProvider, Schema, Space};
