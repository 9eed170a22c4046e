use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::client::StorageClient;
use crate::config::MapperConfig;
use crate::core::{MapperError, Params, Result};
use crate::entity::{Entity, EntityId};
use crate::plugins::{Plugin, PluginRegistry};
use crate::procedure::{FindOrCreateProcedure, StorageFindOrCreate};
use crate::repository::Repository;
use crate::schema::MetadataProvider;

/// Entry point: one repository per space, sharing a client, a catalog and
/// the plugin list.
///
/// Repositories are opened lazily and kept for the mapper's lifetime. Each
/// sits behind its own mutex, which is the critical section for every
/// operation on that space.
pub struct Mapper {
    client: Arc<dyn StorageClient>,
    metadata: Arc<dyn MetadataProvider>,
    plugins: Arc<PluginRegistry>,
    config: MapperConfig,
    procedure: Option<Arc<dyn FindOrCreateProcedure>>,
    repositories: Mutex<HashMap<String, Arc<Mutex<Repository>>>>,
}

impl Mapper {
    pub fn new(client: Arc<dyn StorageClient>, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self::build(client, metadata, MapperConfig::default())
    }

    pub fn with_config(
        client: Arc<dyn StorageClient>,
        metadata: Arc<dyn MetadataProvider>,
        config: MapperConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(client, metadata, config))
    }

    fn build(client: Arc<dyn StorageClient>, metadata: Arc<dyn MetadataProvider>, config: MapperConfig) -> Self {
        let procedure = config
            .find_or_create_procedure
            .then(|| Arc::new(StorageFindOrCreate::new(client.clone())) as Arc<dyn FindOrCreateProcedure>);

        Self {
            client,
            metadata,
            plugins: Arc::new(PluginRegistry::new()),
            config,
            procedure,
            repositories: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the find-or-create procedure used by repositories opened later.
    pub fn set_procedure(&mut self, procedure: Arc<dyn FindOrCreateProcedure>) {
        self.procedure = Some(procedure);
    }

    /// Registers a plugin. Only possible before the first repository is opened.
    pub fn add_plugin(&mut self, plugin: impl Plugin + 'static) -> Result<()> {
        let name = plugin.name();
        let registry = Arc::get_mut(&mut self.plugins).ok_or_else(|| {
            MapperError::Config(format!(
                "plugin '{}' registered after repositories were opened",
                name
            ))
        })?;
        registry.register(Box::new(plugin));
        Ok(())
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn client(&self) -> &Arc<dyn StorageClient> {
        &self.client
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// The repository for `space`, opened on first use.
    pub fn repository(&self, space: &str) -> Result<Arc<Mutex<Repository>>> {
        let mut repositories = self.repositories.lock()?;
        if let Some(repository) = repositories.get(space) {
            return Ok(repository.clone());
        }

        let definition = self.metadata.space(space)?;
        let mut repository = Repository::new(definition, self.client.clone())
            .with_plugins(self.plugins.clone())
            .with_config(&self.config);
        if let Some(procedure) = &self.procedure {
            repository = repository.with_procedure(procedure.clone());
        }

        debug!(space, "opened repository");
        let repository = Arc::new(Mutex::new(repository));
        repositories.insert(space.to_string(), repository.clone());
        Ok(repository)
    }

    /// Runs `f` with exclusive access to the repository for `space`.
    pub fn with_repository<T>(&self, space: &str, f: impl FnOnce(&mut Repository) -> Result<T>) -> Result<T> {
        let repository = self.repository(space)?;
        let mut guard = repository.lock()?;
        f(&mut guard)
    }

    /// Creates and saves an entity, returning a copy of what was stored.
    pub fn create(&self, space: &str, data: impl Into<Params>) -> Result<Entity> {
        self.with_repository(space, |repository| {
            let id = repository.create(data)?;
            repository.save(id)?;
            copy_of(repository, id)
        })
    }

    pub fn find_one(&self, space: &str, params: impl Into<Params>) -> Result<Option<Entity>> {
        self.with_repository(space, |repository| {
            repository
                .find_one(params)?
                .map(|id| copy_of(repository, id))
                .transpose()
        })
    }

    pub fn find_or_create(&self, space: &str, params: impl Into<Params>) -> Result<Entity> {
        self.with_repository(space, |repository| {
            let id = repository.find_or_create(params)?;
            copy_of(repository, id)
        })
    }

    /// Removes every record of `space` matching a non-empty filter.
    pub fn remove(&self, space: &str, params: impl Into<Params>) -> Result<usize> {
        self.with_repository(space, |repository| repository.remove_by(params))
    }
}

fn copy_of(repository: &Repository, id: EntityId) -> Result<Entity> {
    repository
        .get(id)
        .cloned()
        .ok_or(MapperError::EntityNotFound(id))
}
