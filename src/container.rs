//! The container: registration, request scopes and resolution entry points.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::binder::{Arguments, ParamList, ParameterBinder, ResolvedDependencies};
use crate::cache::SingletonCache;
use crate::cleanup::CleanupStack;
use crate::config::ContainerConfig;
use crate::error::{CleanupFailure, DiResult, RequestError};
use crate::graph::{DependencyGraph, GraphBuilder};
use crate::internal::KeySet;
use crate::key::{DependencyKey, RouteId};
use crate::observer::{Observers, ResolutionObserver};
use crate::provider::Provider;
use crate::registry::ProviderRegistry;
use crate::resolver::Resolver;
use crate::scope::RequestScope;

/// Application-level dependency container.
///
/// Registration takes `&mut self` and happens before the container is shared;
/// every registration re-validates the dependency graph of the app scope and
/// of every route, and a registration that would close a cycle is rolled back.
/// Resolution takes `&self`, so a built container is typically wrapped in an
/// `Arc` and shared by all request tasks.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::{DependencyContainer, ParamList, Provider};
///
/// struct Settings {
///     dsn: &'static str,
/// }
/// struct Database {
///     dsn: &'static str,
/// }
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let mut container = DependencyContainer::new();
/// container.register("settings".into(), Provider::value(Settings { dsn: "postgres://db" })).unwrap();
/// container
///     .register(
///         "db".into(),
///         Provider::factory(ParamList::new().typed::<Settings>("settings"), |args| {
///             let settings = args.get::<Settings>("settings")?;
///             Ok::<_, ferrous_depends::ResolutionError>(Database { dsn: settings.dsn })
///         }),
///     )
///     .unwrap();
///
/// let mut scope = container.begin_request_scope();
/// let args = container
///     .resolve_for_call_site(&ParamList::new().typed::<Database>("db"), None, &mut scope)
///     .await
///     .unwrap();
/// assert_eq!(args.get::<Database>("db").unwrap().dsn, "postgres://db");
///
/// let failures = container.end_request_scope(scope).await;
/// assert!(failures.is_empty());
/// # });
/// ```
pub struct DependencyContainer {
    registry: ProviderRegistry,
    singletons: SingletonCache,
    app_cleanup: Mutex<CleanupStack>,
    binder: ParameterBinder,
    config: ContainerConfig,
    observers: Observers,
    route_bound: BTreeMap<RouteId, KeySet>,
    next_request_id: AtomicU64,
}

impl Default for DependencyContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyContainer {
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            registry: ProviderRegistry::new(),
            singletons: SingletonCache::new(),
            app_cleanup: Mutex::new(CleanupStack::new()),
            binder: config.binder(),
            config,
            observers: Observers::default(),
            route_bound: BTreeMap::new(),
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn binder(&self) -> &ParameterBinder {
        &self.binder
    }

    /// Number of singletons created so far.
    pub fn singleton_count(&self) -> usize {
        self.singletons.len()
    }

    /// Registers an observer notified of resolution and cleanup events.
    pub fn add_observer(&mut self, observer: Arc<dyn ResolutionObserver>) {
        self.observers.add(observer);
    }

    // ----- Registration -----

    /// Registers an app-level provider.
    ///
    /// Fails with `DuplicateProvider` if `key` is already registered, with
    /// `CircularDependency` if the provider closes a cycle in the app graph or
    /// in any route's graph, or with `CaptiveDependency` if it makes a
    /// singleton hold a per-request generator. In every case the container is
    /// left unchanged.
    pub fn register(&mut self, key: DependencyKey, provider: Provider) -> DiResult<()> {
        let provider = provider.or_cache_mode(self.config.default_cache_mode);
        let cache_mode = provider.cache_mode();
        self.registry.register(key.clone(), provider)?;

        let route_bound = match self.validate_all(&key) {
            Ok(route_bound) => route_bound,
            Err(err) => {
                self.registry.remove(&key);
                return Err(err);
            }
        };
        self.route_bound = route_bound;
        debug!(key = %key, cache_mode = %cache_mode, "registered provider");
        Ok(())
    }

    /// Registers a provider under the type key of `T`.
    pub fn register_type<T: 'static>(&mut self, provider: Provider) -> DiResult<()> {
        let provider = match provider.produced_type() {
            Some(_) => provider,
            None => provider.produces::<T>(),
        };
        self.register(DependencyKey::of::<T>(), provider)
    }

    /// Installs a route-scoped provider shadowing the app-level one.
    ///
    /// Only the route's effective graph is re-validated; app-level entries
    /// are never touched. Singletons that depend on an overridden key are
    /// cached separately for this route from then on.
    pub fn override_for_route(
        &mut self,
        route: RouteId,
        key: DependencyKey,
        provider: Provider,
    ) -> DiResult<()> {
        let provider = provider.or_cache_mode(self.config.default_cache_mode);
        self.registry.override_for_route(route.clone(), key.clone(), provider)?;

        let graph = match GraphBuilder::new(&self.registry, &self.binder).build(Some(&route)) {
            Ok(graph) => graph,
            Err(err) => {
                self.registry.remove_override(&route, &key);
                return Err(err);
            }
        };
        warn_captives(&graph, &key);
        let bound = self.route_bound_keys(&graph, &route);
        self.route_bound.insert(route.clone(), bound);
        debug!(route = %route, key = %key, "registered route override");
        Ok(())
    }

    /// Builds the app graph and every route graph, and returns the keys each
    /// route has to cache separately.
    fn validate_all(&self, registered: &DependencyKey) -> DiResult<BTreeMap<RouteId, KeySet>> {
        let builder = GraphBuilder::new(&self.registry, &self.binder);
        warn_captives(&builder.build(None)?, registered);

        let mut route_bound = BTreeMap::new();
        for route in self.registry.routes() {
            let graph = builder.build(Some(route))?;
            route_bound.insert(route.clone(), self.route_bound_keys(&graph, route));
        }
        Ok(route_bound)
    }

    /// Keys whose value from `route` may differ from the app-level one: the
    /// route's overrides and everything depending on them.
    fn route_bound_keys(&self, graph: &DependencyGraph, route: &RouteId) -> KeySet {
        graph
            .dependents_closure(self.registry.route_keys(route))
            .into_iter()
            .cloned()
            .collect()
    }

    /// Dependency graph as seen from `route` (`None` for app scope).
    pub fn graph(&self, route: Option<&RouteId>) -> DiResult<DependencyGraph> {
        GraphBuilder::new(&self.registry, &self.binder).build(route)
    }

    // ----- Requests -----

    /// Starts a request: empty per-request cache and cleanup stack.
    pub fn begin_request_scope(&self) -> RequestScope {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        debug!(request_id = id, "request scope started");
        RequestScope::new(id)
    }

    /// Ends a request: drains its cleanup stack in LIFO order and discards the
    /// per-request cache. Teardown failures are returned, never raised.
    pub async fn end_request_scope(&self, scope: RequestScope) -> Vec<CleanupFailure> {
        let request_id = scope.id();
        let failures = scope.close().await;
        if !failures.is_empty() && self.observers.has_observers() {
            self.observers.cleanup_failed(&failures);
        }
        debug!(request_id, failures = failures.len(), "request scope ended");
        failures
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            registry: &self.registry,
            singletons: &self.singletons,
            app_cleanup: &self.app_cleanup,
            binder: &self.binder,
            observers: &self.observers,
            route_bound: &self.route_bound,
            max_depth: self.config.max_depth,
        }
    }

    /// Resolves `keys` and their transitive dependencies within `scope`.
    pub async fn resolve(
        &self,
        keys: &[DependencyKey],
        route: Option<&RouteId>,
        scope: &mut RequestScope,
    ) -> DiResult<ResolvedDependencies> {
        self.resolver().resolve(keys, route, scope).await
    }

    /// Resolves the dependencies of a call site and binds them to its
    /// parameters.
    pub async fn resolve_for_call_site(
        &self,
        params: &ParamList,
        route: Option<&RouteId>,
        scope: &mut RequestScope,
    ) -> DiResult<Arguments> {
        self.resolver().resolve_call_site(params, route, scope).await
    }

    /// Runs one request end to end.
    ///
    /// Begins a scope, lets `setup` provide the special values, resolves the
    /// call site, calls `handler` and ends the scope. The cleanup stack is
    /// drained whether the handler succeeds, fails or is never called because
    /// resolution failed. If the returned future is dropped mid-flight the
    /// scope's teardown is finished on the current tokio runtime.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_depends::{DependencyContainer, ParamList, Provider};
    ///
    /// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
    /// let mut container = DependencyContainer::new();
    /// container.register("greeting".into(), Provider::value("hello")).unwrap();
    ///
    /// let params = ParamList::new().param("request").typed::<&str>("greeting");
    /// let outcome = container
    ///     .run_request(
    ///         &params,
    ///         None,
    ///         |scope| scope.provide_special("request", String::from("GET /")),
    ///         |args| async move {
    ///             let greeting = args.get::<&str>("greeting")?;
    ///             let request = args.get::<String>("request")?;
    ///             Ok::<_, ferrous_depends::ResolutionError>(format!("{greeting}: {request}"))
    ///         },
    ///     )
    ///     .await;
    ///
    /// assert_eq!(outcome.result.unwrap(), "hello: GET /");
    /// assert!(outcome.cleanup_failures.is_empty());
    /// # });
    /// ```
    pub async fn run_request<T, E, S, H, Fut>(
        &self,
        params: &ParamList,
        route: Option<&RouteId>,
        setup: S,
        handler: H,
    ) -> RequestOutcome<T, E>
    where
        S: FnOnce(&mut RequestScope),
        H: FnOnce(Arguments) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut scope = self.begin_request_scope();
        setup(&mut scope);
        let span = info_span!(
            "request",
            request_id = scope.id(),
            route = route.map(RouteId::as_str).unwrap_or("-")
        );

        async move {
            let result = match self.resolve_for_call_site(params, route, &mut scope).await {
                Ok(args) => handler(args).await.map_err(RequestError::Handler),
                Err(err) => Err(RequestError::Resolution(err)),
            };
            let cleanup_failures = self.end_request_scope(scope).await;
            RequestOutcome {
                result,
                cleanup_failures,
            }
        }
        .instrument(span)
        .await
    }

    /// Drains the teardown of singleton generators (LIFO) and releases every
    /// singleton. Later resolutions create fresh singletons.
    pub async fn shutdown(&self) -> Vec<CleanupFailure> {
        let mut stack = self.app_cleanup.lock().take();
        let pending = stack.len();
        let failures = stack.drain_reverse().await;
        self.singletons.clear();
        if !failures.is_empty() && self.observers.has_observers() {
            self.observers.cleanup_failed(&failures);
        }
        info!(pending, failures = failures.len(), "container shut down");
        failures
    }
}

fn warn_captives(graph: &DependencyGraph, registered: &DependencyKey) {
    for (singleton, dependency) in graph.captive_dependencies() {
        if singleton == registered || dependency == registered {
            warn!(
                singleton = %singleton,
                dependency = %dependency,
                "singleton holds a non-singleton dependency; it keeps the first value it sees"
            );
        }
    }
}

impl std::fmt::Debug for DependencyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyContainer")
            .field("providers", &self.registry.len())
            .field("routes", &self.registry.routes().count())
            .field("singletons", &self.singletons.len())
            .field("config", &self.config)
            .field("observers", &self.observers)
            .finish()
    }
}

/// Result of [`DependencyContainer::run_request`].
#[derive(Debug)]
pub struct RequestOutcome<T, E> {
    /// Handler result, or the resolution error that prevented the call
    pub result: Result<T, RequestError<E>>,
    /// Teardown failures, reported alongside the primary result
    pub cleanup_failures: Vec<CleanupFailure>,
}

impl<T, E> RequestOutcome<T, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, RequestError<E>> {
        self.result
    }
}
