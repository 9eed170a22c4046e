pub mod sequence;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::core::{MapperError, Result};
use crate::entity::{Entity, EntityClass};
use crate::schema::Space;

pub use sequence::SequencePlugin;

/// Lifecycle observer shared by every repository of a mapper.
///
/// All methods default to no-ops, so a plugin implements only the events
/// it cares about.
pub trait Plugin: Send + Sync {
    /// Plugin name for logs.
    fn name(&self) -> &'static str;

    /// Entity type to instantiate for records of `space`, if this plugin owns it.
    fn entity_class(&self, _space: &Space) -> Option<Arc<dyn EntityClass>> {
        None
    }

    /// Fills in key fields of a freshly created entity.
    fn generate_key(&self, _entity: &mut Entity, _space: &Space) -> Result<()> {
        Ok(())
    }

    fn after_instantiate(&self, _entity: &mut Entity, _space: &Space) -> Result<()> {
        Ok(())
    }

    fn before_create(&self, _entity: &mut Entity, _space: &Space) -> Result<()> {
        Ok(())
    }

    fn after_create(&self, _entity: &mut Entity, _space: &Space) -> Result<()> {
        Ok(())
    }

    fn before_update(&self, _entity: &mut Entity, _space: &Space) -> Result<()> {
        Ok(())
    }

    fn after_update(&self, _entity: &mut Entity, _space: &Space) -> Result<()> {
        Ok(())
    }

    fn before_remove(&self, _entity: &mut Entity, _space: &Space) -> Result<()> {
        Ok(())
    }

    fn after_remove(&self, _entity: &mut Entity, _space: &Space) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeRemove,
    AfterRemove,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeRemove => "before_remove",
            Self::AfterRemove => "after_remove",
        };
        f.write_str(name)
    }
}

/// Plugins in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "registered mapper plugin");
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// The entity class claimed for `space`; two claims are a configuration error.
    pub fn entity_class(&self, space: &Space) -> Result<Option<Arc<dyn EntityClass>>> {
        let mut claimed = None;
        for plugin in &self.plugins {
            if let Some(class) = plugin.entity_class(space) {
                if claimed.is_some() {
                    return Err(MapperError::EntityClassConflict {
                        space: space.name().to_string(),
                    });
                }
                claimed = Some(class);
            }
        }
        Ok(claimed)
    }

    /// Runs key generation (for new entities) and `after_instantiate`, plugin by plugin.
    pub fn instantiate(&self, entity: &mut Entity, space: &Space, generate_key: bool) -> Result<()> {
        for plugin in &self.plugins {
            if generate_key {
                plugin.generate_key(entity, space)?;
            }
            plugin.after_instantiate(entity, space)?;
        }
        Ok(())
    }

    /// Runs `hook` on every plugin in order, then on the entity's own class.
    pub fn dispatch(&self, hook: Hook, entity: &mut Entity, space: &Space) -> Result<()> {
        for plugin in &self.plugins {
            match hook {
                Hook::BeforeCreate => plugin.before_create(entity, space)?,
                Hook::AfterCreate => plugin.after_create(entity, space)?,
                Hook::BeforeUpdate => plugin.before_update(entity, space)?,
                Hook::AfterUpdate => plugin.after_update(entity, space)?,
                Hook::BeforeRemove => plugin.before_remove(entity, space)?,
                Hook::AfterRemove => plugin.after_remove(entity, space)?,
            }
        }

        let Some(class) = entity.class().cloned() else {
            return Ok(());
        };
        match hook {
            Hook::BeforeCreate => class.before_create(entity),
            Hook::AfterCreate => class.after_create(entity),
            Hook::BeforeUpdate => class.before_update(entity),
            Hook::AfterUpdate => class.after_update(entity),
            Hook::BeforeRemove => class.before_remove(entity),
            Hook::AfterRemove => class.after_remove(entity),
        }
    }
}
