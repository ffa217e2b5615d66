use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::loader::BatchLoader;

/// Per-request keyed loader reuse.
///
/// Fields at different depths of the same query tree ask for their loader by
/// name and get the same instance back, so a settled batch at one depth can
/// be restarted at the next instead of spawning a loader per field. The
/// registry itself is per-request state: nothing in it is ever shared across
/// requests.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: Mutex<HashMap<String, BatchLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the loader registered under `name`, creating it with `init`
    /// on first access.
    pub fn get_or_create(&self, name: &str, init: impl FnOnce() -> BatchLoader) -> BatchLoader {
        self.loaders()
            .entry(name.to_string())
            .or_insert_with(init)
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<BatchLoader> {
        self.loaders().get(name).cloned()
    }

    fn loaders(&self) -> MutexGuard<'_, HashMap<String, BatchLoader>> {
        self.loaders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Arc,
    };

    use serde_json::json;

    use super::*;
    use crate::fetch::Fetcher;

    #[tokio::test]
    async fn same_name_reuses_the_same_loader() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = LoaderRegistry::new();

        let make_loader = {
            let calls = Arc::clone(&calls);
            move || {
                let calls = Arc::clone(&calls);
                BatchLoader::new(Fetcher::function(move |_ids| {
                    calls.fetch_add(1, Relaxed);
                    async { Ok(json!({"1": "one"})) }
                }))
            }
        };

        let first = registry.get_or_create("users", make_loader.clone());
        let second = registry.get_or_create("users", make_loader);

        // Both handles queue into the same batch.
        let a = first.load(1).unwrap();
        let b = second.load(1).unwrap();
        assert_eq!(a.await.unwrap(), json!("one"));
        assert_eq!(b.await.unwrap(), json!("one"));
        assert_eq!(calls.load(Relaxed), 1);
    }

    #[test]
    fn get_only_returns_registered_loaders() {
        let registry = LoaderRegistry::new();
        assert!(registry.get("users").is_none());

        registry.get_or_create("users", || {
            BatchLoader::new(Fetcher::function(|_ids| async { Ok(json!({})) }))
        });
        assert!(registry.get("users").is_some());
    }
}
