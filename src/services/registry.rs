//! Named singleton storage.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type ServiceMap = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Concurrency-safe, string-keyed store for shared services.
///
/// Cloning yields another handle to the same map.
#[derive(Clone, Default)]
pub struct Services {
    inner: Arc<RwLock<ServiceMap>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, ServiceMap> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ServiceMap> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `service` under `name`, replacing any previous value.
    pub fn register<T>(&self, name: impl Into<String>, service: T)
    where
        T: Any + Send + Sync,
    {
        let name = name.into();
        let replaced = self.write().insert(name.clone(), Arc::new(service)).is_some();
        tracing::debug!(service = %name, replaced, "Service registered");
    }

    /// A clone of the service named `name` if it is stored as a `T`.
    pub fn get<T>(&self, name: &str) -> Option<T>
    where
        T: Any + Clone,
    {
        self.read()
            .get(name)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Shared handle to the service named `name` if it is stored as a `T`.
    pub fn get_shared<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let value = self.read().get(name).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Like [`get`](Self::get) but panics when the service is missing or of
    /// another type. Meant for startup wiring, never for request paths.
    pub fn must_get<T>(&self, name: &str) -> T
    where
        T: Any + Clone,
    {
        match self.get(name) {
            Some(value) => value,
            None => panic!("service named {name:?} not found"),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Remove and drop the service named `name`. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    struct Database {
        url: String,
    }

    #[test]
    fn test_register_and_get() {
        let services = Services::new();
        let db = Database {
            url: "postgres://localhost:5432/db".into(),
        };
        services.register("db", db.clone());

        assert_eq!(services.get::<Database>("db"), Some(db));
        assert!(services.has("db"));
        assert!(!services.has("missing"));
    }

    #[test]
    fn test_type_mismatch_is_absence() {
        let services = Services::new();
        services.register("db", "db-conn".to_string());

        assert_eq!(services.get::<Database>("db"), None);
        assert!(services.get_shared::<u32>("db").is_none());
        assert_eq!(services.get::<String>("db").as_deref(), Some("db-conn"));
        // Still registered, just not as that type.
        assert!(services.has("db"));
    }

    #[test]
    fn test_last_writer_wins() {
        let services = Services::new();
        services.register("n", 1u32);
        services.register("n", 2u32);
        assert_eq!(services.get::<u32>("n"), Some(2));
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_get_shared_without_clone() {
        struct Pool(#[allow(dead_code)] Vec<u8>);

        let services = Services::new();
        services.register("pool", Pool(vec![1, 2, 3]));

        let a = services.get_shared::<Pool>("pool").unwrap();
        let b = services.get_shared::<Pool>("pool").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    #[should_panic(expected = "service named \"missing\" not found")]
    fn test_must_get_panics_on_missing() {
        Services::new().must_get::<Database>("missing");
    }

    #[test]
    fn test_remove_and_names() {
        let services = Services::new();
        services.register("b", 1u8);
        services.register("a", 2u8);
        assert_eq!(services.names(), vec!["a", "b"]);

        assert!(services.remove("a"));
        assert!(!services.remove("a"));
        assert_eq!(services.names(), vec!["b"]);
    }

    #[test]
    fn test_concurrent_access() {
        let services = Services::new();
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let services = services.clone();
                thread::spawn(move || {
                    services.register(format!("svc-{i}"), i);
                    for _ in 0..100 {
                        assert_eq!(services.get::<u32>(&format!("svc-{i}")), Some(i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(services.len(), 8);
    }
}
