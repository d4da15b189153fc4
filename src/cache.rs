//! Singleton and per-request value caches.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::error::DiResult;
use crate::internal::{FastMap, KeyMap};
use crate::key::{DependencyKey, RouteId};
use crate::value::ResolvedValue;

/// Process-wide cache of singleton values, owned by the container.
///
/// Each key gets its own async `OnceCell`. The map lock is only held long
/// enough to fetch the cell, never while a factory runs, so unrelated
/// singletons initialize concurrently while callers racing on the same key
/// wait for the single in-flight initialization and then observe its value.
/// An initialization that fails leaves the cell empty, so a later resolution
/// retries.
///
/// Cells are addressed by key and an optional route. App-wide singletons use
/// `None`; a singleton whose provider, or any of its transitive dependencies,
/// is overridden by a route is cached separately for that route.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::{DependencyKey, ResolvedValue, RouteId, SingletonCache};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let cache = SingletonCache::new();
/// let key = DependencyKey::named("config");
///
/// let first = cache
///     .get_or_create(None, &key, || async { Ok(ResolvedValue::new(1u8)) })
///     .await
///     .unwrap();
/// let second = cache
///     .get_or_create(None, &key, || async { Ok(ResolvedValue::new(2u8)) })
///     .await
///     .unwrap();
///
/// assert!(first.ptr_eq(&second));
/// assert_eq!(*second.downcast::<u8>().unwrap(), 1);
///
/// let route = RouteId::new("/test");
/// let scoped = cache
///     .get_or_create(Some(&route), &key, || async { Ok(ResolvedValue::new(3u8)) })
///     .await
///     .unwrap();
/// assert_eq!(*scoped.downcast::<u8>().unwrap(), 3);
/// assert_eq!(cache.len(), 2);
/// # });
/// ```
#[derive(Default)]
pub struct SingletonCache {
    cells: Mutex<FastMap<(Option<RouteId>, DependencyKey), Arc<OnceCell<ResolvedValue>>>>,
}

impl SingletonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Already-initialized value for `key` in `route`'s cell (`None` for the
    /// app-wide one), if any.
    pub fn get(&self, route: Option<&RouteId>, key: &DependencyKey) -> Option<ResolvedValue> {
        let slot = (route.cloned(), key.clone());
        self.cells.lock().get(&slot).and_then(|cell| cell.get().cloned())
    }

    /// Returns the cached value or runs `init` exactly once to create it.
    pub async fn get_or_create<F, Fut>(
        &self,
        route: Option<&RouteId>,
        key: &DependencyKey,
        init: F,
    ) -> DiResult<ResolvedValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DiResult<ResolvedValue>>,
    {
        let cell = self
            .cells
            .lock()
            .entry((route.cloned(), key.clone()))
            .or_default()
            .clone();
        cell.get_or_try_init(init).await.cloned()
    }

    /// Number of initialized singletons.
    pub fn len(&self) -> usize {
        self.cells.lock().values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases every singleton. Used at container shutdown.
    pub fn clear(&self) {
        self.cells.lock().clear();
    }
}

impl std::fmt::Debug for SingletonCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonCache")
            .field("initialized", &self.len())
            .finish()
    }
}

/// Per-request cache. Owned exclusively by one request scope, so it needs no
/// synchronization.
#[derive(Debug, Default)]
pub struct RequestCache {
    values: KeyMap<ResolvedValue>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DependencyKey) -> Option<&ResolvedValue> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: DependencyKey, value: ResolvedValue) {
        self.values.insert(key, value);
    }

    pub fn contains(&self, key: &DependencyKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn failed_init_is_retried() {
        let cache = SingletonCache::new();
        let key = DependencyKey::named("flaky");
        let attempts = AtomicUsize::new(0);

        let first = cache
            .get_or_create(None, &key, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(crate::ResolutionError::provider_failed(&key, "not yet"))
            })
            .await;
        assert!(first.is_err());
        assert!(cache.get(None, &key).is_none());

        let second = cache
            .get_or_create(None, &key, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(ResolvedValue::new("ready"))
            })
            .await
            .unwrap();
        assert_eq!(*second.downcast::<&str>().unwrap(), "ready");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn request_cache_is_plain_map() {
        let mut cache = RequestCache::new();
        cache.insert("a".into(), ResolvedValue::new(1i32));
        assert!(cache.contains(&"a".into()));
        cache.clear();
        assert!(cache.is_empty());
    }
}
