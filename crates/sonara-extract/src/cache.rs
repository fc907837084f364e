//! Per-worker model cache.
//!
//! Loading an image model is far more expensive than running it, so each
//! extractor keeps the models it has loaded in a [`ModelCache`] keyed by
//! model identity. The cache lives exactly as long as its extractor and is
//! never shared across workers.

use sonara_core::Result;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Lazily populated map from model identity to loaded model.
#[derive(Debug)]
pub struct ModelCache<M> {
    models: HashMap<String, M>,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ModelCache<M> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Return the cached model for `key`, loading it with `init` on a miss.
    ///
    /// A failed load is not cached, so the next call retries.
    pub fn get_or_try_insert_with<F>(&mut self, key: &str, init: F) -> Result<&mut M>
    where
        F: FnOnce() -> Result<M>,
    {
        match self.models.entry(key.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                log::info!("Loading model '{key}'");
                let model = init()?;
                Ok(entry.insert(model))
            }
        }
    }

    /// Whether a model is loaded for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.models.contains_key(key)
    }

    /// Number of loaded models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Drop every loaded model.
    pub fn clear(&mut self) {
        self.models.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sonara_core::Error;

    #[test]
    fn test_loads_once_per_key() {
        let mut cache = ModelCache::new();
        let mut loads = 0;

        for _ in 0..3 {
            let model = cache
                .get_or_try_insert_with("clip-vit-b32", || {
                    loads += 1;
                    Ok(vec![1u8, 2, 3])
                })
                .unwrap();
            assert_eq!(model.len(), 3);
        }
        assert_eq!(loads, 1);
        assert!(cache.contains("clip-vit-b32"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let mut cache: ModelCache<u32> = ModelCache::new();
        let err = cache
            .get_or_try_insert_with("resnet50", || Err(Error::config("download failed")))
            .unwrap_err();
        assert!(err.is_config());
        assert!(cache.is_empty());

        assert_eq!(*cache.get_or_try_insert_with("resnet50", || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_clear() {
        let mut cache = ModelCache::new();
        cache.get_or_try_insert_with("a", || Ok(1)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
