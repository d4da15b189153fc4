//! Provider registry: app-level registrations plus per-route overrides.

use std::collections::BTreeMap;

use crate::error::{DiResult, ProviderScope, ResolutionError};
use crate::internal::KeyMap;
use crate::key::{DependencyKey, RouteId};
use crate::provider::Provider;

/// Key → provider mapping at app scope, shadowed per route.
///
/// A route override is only visible to resolutions triggered by that route and
/// never mutates the app-level entry. Registration order at app scope is kept;
/// graph construction walks keys in that order so cycle reports are stable.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::{DependencyKey, Provider, ProviderRegistry, RouteId};
///
/// let mut registry = ProviderRegistry::new();
/// registry.register("db".into(), Provider::value("postgres")).unwrap();
/// registry
///     .override_for_route(RouteId::new("/test"), "db".into(), Provider::value("sqlite"))
///     .unwrap();
///
/// let key = DependencyKey::named("db");
/// let admin = RouteId::new("/admin");
/// let test = RouteId::new("/test");
/// assert!(registry.lookup(&key, Some(&admin)).is_ok());
/// assert!(registry.route_provider(&test, &key).is_some());
/// assert!(registry.route_provider(&admin, &key).is_none());
///
/// // App scope duplicates are rejected
/// assert!(registry.register("db".into(), Provider::value("mysql")).is_err());
/// ```
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    app: KeyMap<Provider>,
    order: Vec<DependencyKey>,
    routes: BTreeMap<RouteId, RouteOverrides>,
}

#[derive(Debug, Default)]
struct RouteOverrides {
    providers: KeyMap<Provider>,
    order: Vec<DependencyKey>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an app-level provider.
    pub fn register(&mut self, key: DependencyKey, provider: Provider) -> DiResult<()> {
        if self.app.contains_key(&key) {
            return Err(ResolutionError::DuplicateProvider {
                key,
                scope: ProviderScope::App,
            });
        }
        self.order.push(key.clone());
        self.app.insert(key, provider);
        Ok(())
    }

    /// Installs a route-scoped shadow for `key`.
    pub fn override_for_route(
        &mut self,
        route: RouteId,
        key: DependencyKey,
        provider: Provider,
    ) -> DiResult<()> {
        let overrides = self.routes.entry(route.clone()).or_default();
        if overrides.providers.contains_key(&key) {
            return Err(ResolutionError::DuplicateProvider {
                key,
                scope: ProviderScope::Route(route),
            });
        }
        overrides.order.push(key.clone());
        overrides.providers.insert(key, provider);
        Ok(())
    }

    /// Effective provider for `key` as seen from `route`.
    pub fn lookup(&self, key: &DependencyKey, route: Option<&RouteId>) -> DiResult<&Provider> {
        self.get(key, route)
            .ok_or_else(|| ResolutionError::MissingDependency { key: key.clone() })
    }

    pub(crate) fn get(&self, key: &DependencyKey, route: Option<&RouteId>) -> Option<&Provider> {
        route
            .and_then(|route| self.route_provider(route, key))
            .or_else(|| self.app.get(key))
    }

    /// Whether `key` resolves to a provider from `route`.
    pub fn contains(&self, key: &DependencyKey, route: Option<&RouteId>) -> bool {
        self.get(key, route).is_some()
    }

    /// App-level provider, ignoring overrides.
    pub fn app_provider(&self, key: &DependencyKey) -> Option<&Provider> {
        self.app.get(key)
    }

    /// The override installed by `route` for `key`, if any.
    pub fn route_provider(&self, route: &RouteId, key: &DependencyKey) -> Option<&Provider> {
        self.routes.get(route).and_then(|o| o.providers.get(key))
    }

    /// Keys `route` overrides, in override order.
    pub fn route_keys(&self, route: &RouteId) -> impl Iterator<Item = &DependencyKey> {
        self.routes.get(route).into_iter().flat_map(|o| o.order.iter())
    }

    /// App-level keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &DependencyKey> {
        self.order.iter()
    }

    /// Keys visible from `route`: app keys in registration order, then keys
    /// only the route introduces.
    pub fn effective_keys(&self, route: Option<&RouteId>) -> Vec<DependencyKey> {
        let mut keys = self.order.clone();
        if let Some(overrides) = route.and_then(|r| self.routes.get(r)) {
            keys.extend(
                overrides
                    .order
                    .iter()
                    .filter(|k| !self.app.contains_key(k))
                    .cloned(),
            );
        }
        keys
    }

    /// Routes that carry at least one override, sorted.
    pub fn routes(&self) -> impl Iterator<Item = &RouteId> {
        self.routes.keys()
    }

    /// Number of app-level providers.
    pub fn len(&self) -> usize {
        self.app.len()
    }

    pub fn is_empty(&self) -> bool {
        self.app.is_empty()
    }

    /// Undoes the most recent `register` of `key`. Used to roll back a
    /// registration that introduced a cycle.
    pub(crate) fn remove(&mut self, key: &DependencyKey) {
        if self.app.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    /// Undoes an override; drops the route entry when it becomes empty.
    pub(crate) fn remove_override(&mut self, route: &RouteId, key: &DependencyKey) {
        if let Some(overrides) = self.routes.get_mut(route) {
            if overrides.providers.remove(key).is_some() {
                overrides.order.retain(|k| k != key);
            }
            if overrides.providers.is_empty() {
                self.routes.remove(route);
            }
        }
    }
}
