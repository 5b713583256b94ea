//! Process-wide storage lookup.
//!
//! One [`StorageRegistry`] is constructed at boot and handed to every
//! consumer. Registration is last-write-wins.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use hearth_core::HealthCheck;
use tokio::time::Instant;

use crate::base::BaseStorage;

/// A storage the registry can hold.
pub trait ManagedStorage: Send + Sync + 'static {
    fn base(&self) -> &BaseStorage;

    /// Upcast for typed lookups through [`StorageRegistry::get_as`].
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn name(&self) -> &str {
        self.base().name()
    }
}

/// Implement [`ManagedStorage`] for types exposing `fn base(&self) -> &BaseStorage`.
#[macro_export]
macro_rules! impl_managed_storage {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::registry::ManagedStorage for $ty {
                fn base(&self) -> &$crate::base::BaseStorage {
                    <$ty>::base(self)
                }

                fn into_any(
                    self: ::std::sync::Arc<Self>,
                ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                    self
                }
            }
        )+
    };
}

impl ManagedStorage for BaseStorage {
    fn base(&self) -> &BaseStorage {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Named registry of booted storages.
#[derive(Default)]
pub struct StorageRegistry {
    storages: RwLock<HashMap<String, Arc<dyn ManagedStorage>>>,
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `storage` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, storage: Arc<dyn ManagedStorage>) {
        let name = name.into();
        let mut storages = self
            .storages
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if storages.insert(name.clone(), storage).is_some() {
            tracing::warn!(storage = %name, "storage already registered, replacing it");
        } else {
            tracing::info!(storage = %name, "storage registered");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedStorage>> {
        self.storages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Typed lookup. `None` if the name is unknown or holds another type.
    pub fn get_as<T: ManagedStorage>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name)?.into_any().downcast::<T>().ok()
    }

    pub fn has(&self, name: &str) -> bool {
        self.storages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .storages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.storages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn ManagedStorage>)> {
        let mut entries: Vec<_> = self
            .storages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, storage)| (name.clone(), storage.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Wait until every registered storage reports ready, sharing one
    /// deadline across all of them.
    pub async fn await_all(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        for (name, storage) in self.snapshot() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !storage.base().await_ready(remaining).await {
                tracing::warn!(storage = %name, "storage not ready before deadline");
                return false;
            }
        }
        true
    }

    /// Health of every registered storage, sorted by name.
    pub fn health(&self) -> Vec<HealthCheck> {
        self.snapshot()
            .into_iter()
            .map(|(name, storage)| {
                let mut check = storage.base().health();
                check.component = name;
                check
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::domain::{LogStorage, UserStorage};
    use crate::mock::MockDatabase;
    use hearth_core::StorageConfig;
    use std::sync::Mutex;
    use tracing::field::{Field, Visit};
    use tracing::Level;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn base(name: &str) -> Arc<BaseStorage> {
        Arc::new(BaseStorage::new(
            StorageConfig::new(name, name).unwrap(),
            Arc::new(MockDatabase::new()),
            Arc::new(MemoryCache::new()),
        ))
    }

    /// Records the level and `storage` field of every event.
    #[derive(Clone, Default)]
    struct CapturedEvents(Arc<Mutex<Vec<(Level, Option<String>)>>>);

    impl CapturedEvents {
        fn warnings_for(&self, storage: &str) -> usize {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(level, field)| *level == Level::WARN && field.as_deref() == Some(storage))
                .count()
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for CapturedEvents {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            struct StorageField(Option<String>);
            impl Visit for StorageField {
                fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                    if field.name() == "storage" {
                        self.0 = Some(format!("{:?}", value));
                    }
                }
            }

            let mut visitor = StorageField(None);
            event.record(&mut visitor);
            self.0
                .lock()
                .unwrap()
                .push((*event.metadata().level(), visitor.0));
        }
    }

    #[test]
    fn test_register_overwrites() {
        let registry = StorageRegistry::new();
        let first = base("x");
        let second = base("x");
        let events = CapturedEvents::default();
        let subscriber = tracing_subscriber::registry().with(events.clone());

        tracing::subscriber::with_default(subscriber, || {
            registry.register("x", first.clone());
            assert_eq!(events.warnings_for("x"), 0);
            registry.register("x", second.clone());
        });
        assert_eq!(events.warnings_for("x"), 1);

        let got = registry.get_as::<BaseStorage>("x").unwrap();
        assert!(Arc::ptr_eq(&got, &second));
        assert!(!Arc::ptr_eq(&got, &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_missing_and_has() {
        let registry = StorageRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(!registry.has("nope"));
        registry.register("users", base("users"));
        assert!(registry.has("users"));
    }

    #[test]
    fn test_get_as_wrong_type_is_none() {
        let db = Arc::new(MockDatabase::new());
        let cache = Arc::new(MemoryCache::new());
        let registry = StorageRegistry::new();
        registry.register("users", Arc::new(UserStorage::new(db, cache).unwrap()));

        assert!(registry.get_as::<UserStorage>("users").is_some());
        assert!(registry.get_as::<LogStorage>("users").is_none());
        assert_eq!(registry.get("users").unwrap().name(), "users");
    }

    #[test]
    fn test_names_sorted() {
        let registry = StorageRegistry::new();
        for name in ["penalties", "characters", "users"] {
            registry.register(name, base(name));
        }
        assert_eq!(registry.names(), vec!["characters", "penalties", "users"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_all_and_health() {
        let registry = StorageRegistry::new();
        let db = Arc::new(MockDatabase::new());
        let storage = Arc::new(BaseStorage::new(
            StorageConfig::new("users", "user").unwrap(),
            db.clone(),
            Arc::new(MemoryCache::new()),
        ));
        registry.register("users", storage);
        assert!(registry.await_all(Duration::from_millis(100)).await);
        assert!(registry.health().iter().all(HealthCheck::is_healthy));

        db.set_ready(false);
        assert!(!registry.await_all(Duration::from_millis(100)).await);
        let health = registry.health();
        assert_eq!(health[0].component, "users");
        assert!(!health[0].is_healthy());
    }
}
