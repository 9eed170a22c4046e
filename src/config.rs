use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::core::{MapperError, Result};

/// Mapper configuration
///
/// Shared by every repository a [`crate::Mapper`] opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Memoize find results until the next mutation
    pub query_cache: bool,

    /// Maximum number of find signatures kept per repository
    pub cache_capacity: usize,

    /// Route find_or_create through the store-side find-or-create procedure
    pub find_or_create_procedure: bool,
}

impl MapperConfig {
    pub fn new() -> Self {
        Self {
            query_cache: true,
            cache_capacity: 1024,
            find_or_create_procedure: true,
        }
    }

    /// Enable or disable the query cache
    pub fn query_cache(mut self, enabled: bool) -> Self {
        self.query_cache = enabled;
        self
    }

    /// Set the cache capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Enable or disable the find-or-create procedure
    pub fn find_or_create_procedure(mut self, enabled: bool) -> Self {
        self.find_or_create_procedure = enabled;
        self
    }

    /// Parse from a JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Cache capacity as required by the cache, when caching is on
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        if !self.query_cache {
            return None;
        }
        NonZeroUsize::new(self.cache_capacity)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.query_cache && self.cache_capacity == 0 {
            return Err(MapperError::Config(
                "cache_capacity must be > 0 when query_cache is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MapperConfig::default();
        assert!(config.query_cache);
        assert_eq!(config.cache_capacity, 1024);
        assert!(config.find_or_create_procedure);
    }

    #[test]
    fn test_builder_pattern() {
        let config = MapperConfig::new()
            .query_cache(false)
            .cache_capacity(16)
            .find_or_create_procedure(false);

        assert!(!config.query_cache);
        assert_eq!(config.cache_capacity, 16);
        assert!(!config.find_or_create_procedure);
        assert_eq!(config.capacity(), None);
    }

    #[test]
    fn test_from_json() {
        let config = MapperConfig::from_json(r#"{"cache_capacity": 8}"#).unwrap();
        assert_eq!(config.cache_capacity, 8);
        assert!(config.query_cache);
    }

    #[test]
    fn test_validate() {
        assert!(MapperConfig::new().validate().is_ok());
        assert!(MapperConfig::new().cache_capacity(0).validate().is_err());
        assert!(
            MapperConfig::new()
                .query_cache(false)
                .cache_capacity(0)
                .validate()
                .is_ok()
        );
        assert!(MapperConfig::from_json(r#"{"cache_capacity": 0}"#).is_err());
    }
}
