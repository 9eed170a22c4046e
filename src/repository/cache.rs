use std::num::NonZeroUsize;

use lru::LruCache;

use crate::core::Params;
use crate::entity::EntityId;

/// Result of a find call as it is memoized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    One(Option<EntityId>),
    Many(Vec<EntityId>),
}

/// Exact call signature: single-result flag plus the params as given.
pub type Signature = (bool, Params);

/// Find results keyed by call signature, cleared as a whole on any mutation.
pub struct QueryCache {
    entries: Option<LruCache<Signature, Found>>,
}

impl QueryCache {
    /// A cache holding up to `capacity` signatures.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Some(LruCache::new(capacity)),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { entries: None }
    }

    pub fn get(&mut self, signature: &Signature) -> Option<Found> {
        self.entries.as_mut()?.get(signature).cloned()
    }

    pub fn put(&mut self, signature: Signature, found: Found) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(signature, found);
        }
    }

    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_signature_is_exact() {
        let mut cache = QueryCache::new(capacity(8));
        cache.put((true, Params::from(1u64)), Found::One(None));

        assert_eq!(cache.get(&(true, Params::from(1u64))), Some(Found::One(None)));
        assert_eq!(cache.get(&(false, Params::from(1u64))), None);
        assert_eq!(cache.get(&(true, Params::by("id", 1u64))), None);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut cache = QueryCache::new(capacity(8));
        cache.put((false, Params::all()), Found::Many(vec![]));
        cache.put((true, Params::all()), Found::One(None));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut cache = QueryCache::new(capacity(1));
        cache.put((true, Params::from(1u64)), Found::One(None));
        cache.put((true, Params::from(2u64)), Found::One(None));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&(true, Params::from(1u64))).is_none());
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let mut cache = QueryCache::disabled();
        cache.put((true, Params::all()), Found::One(None));
        assert!(cache.get(&(true, Params::all())).is_none());
    }
}
