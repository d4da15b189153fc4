//! Recursive, memoized dependency resolution.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::binder::{Arguments, ParamList, ParameterBinder, ResolvedDependencies};
use crate::cache::SingletonCache;
use crate::cache_mode::CacheMode;
use crate::cleanup::CleanupStack;
use crate::error::{DiResult, ResolutionError};
use crate::internal::{KeyMap, KeySet, ResolutionPath};
use crate::key::{DependencyKey, RouteId};
use crate::observer::Observers;
use crate::provider::{Provider, ProviderKind};
use crate::registry::ProviderRegistry;
use crate::scope::RequestScope;
use crate::value::ResolvedValue;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where a generator's teardown goes.
#[derive(Clone, Copy)]
enum Owner {
    /// Container cleanup stack, drained at shutdown
    App,
    /// Request cleanup stack, drained at request end
    Request,
}

/// One resolution pass: the memo, the current path and the request being
/// served.
struct Pass<'s> {
    route: Option<&'s RouteId>,
    scope: &'s mut RequestScope,
    memo: KeyMap<ResolvedValue>,
    path: ResolutionPath,
}

/// Borrowed view of the container used for one or more passes.
pub(crate) struct Resolver<'a> {
    pub(crate) registry: &'a ProviderRegistry,
    pub(crate) singletons: &'a SingletonCache,
    pub(crate) app_cleanup: &'a Mutex<CleanupStack>,
    pub(crate) binder: &'a ParameterBinder,
    pub(crate) observers: &'a Observers,
    /// Per route, keys whose singletons are cached for that route only
    pub(crate) route_bound: &'a BTreeMap<RouteId, KeySet>,
    pub(crate) max_depth: usize,
}

impl<'a> Resolver<'a> {
    /// Resolves `keys` (and, transitively, their dependencies) for one request.
    /// Reserved names are skipped.
    pub(crate) async fn resolve(
        &self,
        keys: &[DependencyKey],
        route: Option<&RouteId>,
        scope: &mut RequestScope,
    ) -> DiResult<ResolvedDependencies> {
        let mut pass = Pass {
            route,
            scope,
            memo: KeyMap::default(),
            path: ResolutionPath::new(self.max_depth),
        };

        let mut resolved = ResolvedDependencies::new();
        for key in keys {
            if key.name().is_some_and(|name| self.binder.is_reserved(name)) {
                continue;
            }
            let value = self.resolve_key(key.clone(), &mut pass).await?;
            resolved.insert(key.clone(), value);
        }
        Ok(resolved)
    }

    /// Resolves and binds the parameters of a call site.
    pub(crate) async fn resolve_call_site(
        &self,
        params: &ParamList,
        route: Option<&RouteId>,
        scope: &mut RequestScope,
    ) -> DiResult<Arguments> {
        let keys = self
            .binder
            .dependency_keys(params, |k| self.registry.contains(k, route));
        let resolved = self.resolve(&keys, route, scope).await?;
        self.binder.bind(params, &resolved, &scope.special)
    }

    fn resolve_key<'x, 's: 'x>(
        &'x self,
        key: DependencyKey,
        pass: &'x mut Pass<'s>,
    ) -> BoxFuture<'x, DiResult<ResolvedValue>> {
        Box::pin(async move {
            if let Some(value) = pass.memo.get(&key) {
                return Ok(value.clone());
            }

            pass.path.enter(&key)?;
            let result = self.produce(&key, pass).await;
            pass.path.exit(&key);

            match result {
                Ok(value) => {
                    pass.memo.insert(key, value.clone());
                    Ok(value)
                }
                Err(err) => {
                    if self.observers.has_observers() {
                        self.observers.failed(&key, &err);
                    }
                    Err(err)
                }
            }
        })
    }

    async fn produce(&self, key: &DependencyKey, pass: &mut Pass<'_>) -> DiResult<ResolvedValue> {
        let provider = self.registry.lookup(key, pass.route)?;

        if let ProviderKind::Value(value) = provider.kind() {
            return Ok(value.clone());
        }

        match provider.cache_mode() {
            CacheMode::Singleton => {
                let slot = pass
                    .route
                    .filter(|route| self.route_bound.get(*route).is_some_and(|keys| keys.contains(key)));
                if let Some(value) = self.singletons.get(slot, key) {
                    return Ok(value);
                }
                self.singletons
                    .get_or_create(slot, key, move || self.instantiate(key, provider, pass, Owner::App))
                    .await
            }
            CacheMode::PerRequest => {
                if let Some(value) = pass.scope.cache.get(key) {
                    return Ok(value.clone());
                }
                let value = self.instantiate(key, provider, pass, Owner::Request).await?;
                pass.scope.cache.insert(key.clone(), value.clone());
                Ok(value)
            }
            CacheMode::None => self.instantiate(key, provider, pass, Owner::Request).await,
        }
    }

    /// Resolves the provider's own dependencies, binds them and invokes it.
    async fn instantiate(
        &self,
        key: &DependencyKey,
        provider: &Provider,
        pass: &mut Pass<'_>,
        owner: Owner,
    ) -> DiResult<ResolvedValue> {
        let route = pass.route;
        let deps = provider.dependency_keys(self.binder, |k| self.registry.contains(k, route));

        let mut resolved = ResolvedDependencies::new();
        for dep in deps {
            if dep.name().is_some_and(|name| self.binder.is_reserved(name)) {
                continue;
            }
            let value = self.resolve_key(dep.clone(), pass).await?;
            resolved.insert(dep, value);
        }
        let args = self.binder.bind(provider.params(), &resolved, &pass.scope.special)?;

        if self.observers.has_observers() {
            self.observers.resolving(key);
        }
        let started = Instant::now();
        let instance = provider.instantiate(key, args).await?;

        // Teardown is registered before any further check so an opened
        // resource is always closed.
        if let Some(teardown) = instance.teardown {
            match owner {
                Owner::App => self.app_cleanup.lock().push(teardown),
                Owner::Request => pass.scope.cleanup.push(teardown),
            }
        }

        if let Some(expected) = provider.produced_type() {
            if !instance.value.type_tag().is_compatible(&expected) {
                return Err(ResolutionError::TypeMismatch {
                    key: key.clone(),
                    expected: expected.name(),
                    actual: instance.value.type_name(),
                });
            }
        }

        let elapsed = started.elapsed();
        if self.observers.has_observers() {
            self.observers.resolved(key, elapsed);
        }
        debug!(
            key = %key,
            cache_mode = %provider.cache_mode(),
            depth = pass.path.depth(),
            elapsed_us = elapsed.as_micros() as u64,
            "dependency created"
        );
        Ok(instance.value)
    }
}
