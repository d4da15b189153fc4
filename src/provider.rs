//! Provider definitions: values, factories and generator-style resources.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::binder::{Arguments, ParamList, ParameterBinder};
use crate::cache_mode::CacheMode;
use crate::cleanup::CleanupAction;
use crate::error::{BoxError, DiResult, ResolutionError};
use crate::key::{DependencyKey, TypeTag};
use crate::value::ResolvedValue;

/// Trait for providers that build a value from their bound arguments.
///
/// Closures cover most cases (see [`Provider::factory`] and
/// [`Provider::async_factory`]); implement this trait directly for factories
/// that carry their own state.
///
/// # Examples
///
/// ```
/// use ferrous_depends::{Arguments, BoxError, Factory, ParamList, Provider, ResolvedValue};
/// use async_trait::async_trait;
///
/// struct DatabasePool {
///     url: String,
/// }
///
/// struct PoolFactory {
///     url: String,
/// }
///
/// #[async_trait]
/// impl Factory for PoolFactory {
///     async fn create(&self, _args: Arguments) -> Result<ResolvedValue, BoxError> {
///         Ok(ResolvedValue::new(DatabasePool { url: self.url.clone() }))
///     }
/// }
///
/// let provider = Provider::from_factory(
///     ParamList::new(),
///     PoolFactory { url: "postgres://localhost".into() },
/// )
/// .produces::<DatabasePool>()
/// .singleton();
/// assert!(provider.cache_mode().is_singleton());
/// ```
#[async_trait]
pub trait Factory: Send + Sync + 'static {
    async fn create(&self, args: Arguments) -> Result<ResolvedValue, BoxError>;
}

/// Two-phase resource: `open` produces the value, `close` tears it down once
/// the owning scope ends.
///
/// This is the generator ("yield once, resume for teardown") shape expressed as
/// scoped acquisition with guaranteed release. `close` runs from the cleanup
/// stack even when the handler fails or the request is cancelled.
///
/// # Examples
///
/// ```
/// use ferrous_depends::{Arguments, BoxError, ParamList, Provider, Resource, ResolvedValue};
/// use async_trait::async_trait;
///
/// struct Connection {
///     id: u32,
/// }
///
/// struct ConnectionResource;
///
/// #[async_trait]
/// impl Resource for ConnectionResource {
///     async fn open(&self, _args: Arguments) -> Result<ResolvedValue, BoxError> {
///         Ok(ResolvedValue::new(Connection { id: 1 }))
///     }
///
///     async fn close(&self, value: ResolvedValue) -> Result<(), BoxError> {
///         let conn = value.downcast::<Connection>().ok_or("not a connection")?;
///         println!("closing connection {}", conn.id);
///         Ok(())
///     }
/// }
///
/// let provider = Provider::from_resource(ParamList::new(), ConnectionResource);
/// assert!(provider.is_generator());
/// ```
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    async fn open(&self, args: Arguments) -> Result<ResolvedValue, BoxError>;

    async fn close(&self, value: ResolvedValue) -> Result<(), BoxError>;
}

/// What a provider does when invoked.
#[derive(Clone)]
pub enum ProviderKind {
    /// Pre-computed constant, never invoked
    Value(ResolvedValue),
    /// Builds a value from its arguments
    Factory(Arc<dyn Factory>),
    /// Opens a value and registers its teardown
    Generator(Arc<dyn Resource>),
}

impl fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ProviderKind::Factory(_) => f.write_str("Factory"),
            ProviderKind::Generator(_) => f.write_str("Generator"),
        }
    }
}

/// A registered recipe for producing a dependency's value.
///
/// Besides its [`ProviderKind`], a provider carries the parameter table of its
/// own factory, an optional explicit `depends_on` list (which takes precedence
/// over the keys derived from the parameter table), its [`CacheMode`] and,
/// optionally, the type it is declared to produce.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::{CacheMode, ParamList, Provider};
///
/// struct Settings {
///     dsn: String,
/// }
/// struct Pool {
///     dsn: String,
/// }
///
/// let settings = Provider::value(Settings { dsn: "postgres://localhost".into() });
/// let pool = Provider::factory(ParamList::new().typed::<Settings>("settings"), |args| {
///     let settings = args.get::<Settings>("settings")?;
///     Ok::<_, ferrous_depends::ResolutionError>(Pool { dsn: settings.dsn.clone() })
/// })
/// .singleton();
///
/// assert_eq!(settings.cache_mode(), CacheMode::Singleton);
/// assert_eq!(pool.cache_mode(), CacheMode::Singleton);
/// assert!(pool.explicit_depends_on().is_none());
/// ```
#[derive(Clone)]
pub struct Provider {
    kind: ProviderKind,
    params: ParamList,
    depends_on: Option<Vec<DependencyKey>>,
    cache_mode: Option<CacheMode>,
    produces: Option<TypeTag>,
}

impl Provider {
    fn with_kind(kind: ProviderKind, params: ParamList, produces: Option<TypeTag>) -> Self {
        Self {
            kind,
            params,
            depends_on: None,
            cache_mode: None,
            produces,
        }
    }

    /// Constant value. Behaves as a singleton and is never re-invoked.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        let value = ResolvedValue::new(value);
        let tag = value.type_tag();
        Self::with_kind(ProviderKind::Value(value), ParamList::new(), Some(tag))
            .with_cache_mode(CacheMode::Singleton)
    }

    /// Synchronous factory.
    pub fn factory<T, E, F>(params: ParamList, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError> + Send + 'static,
        F: Fn(Arguments) -> Result<T, E> + Send + Sync + 'static,
    {
        Self::from_factory(params, SyncFactory::new(factory)).produces::<T>()
    }

    /// Asynchronous factory.
    pub fn async_factory<T, E, F, Fut>(params: ParamList, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError> + Send + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::from_factory(params, AsyncFnFactory::new(factory)).produces::<T>()
    }

    /// Synchronous generator: `open` yields the value, `close` receives it back
    /// at teardown.
    pub fn generator<T, E, E2, O, C>(params: ParamList, open: O, close: C) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError> + Send + 'static,
        E2: Into<BoxError> + Send + 'static,
        O: Fn(Arguments) -> Result<T, E> + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Result<(), E2> + Send + Sync + 'static,
    {
        Self::from_resource(params, SyncGenerator::new(open, close)).produces::<T>()
    }

    /// Asynchronous generator.
    pub fn async_generator<T, E, E2, O, OFut, C, CFut>(params: ParamList, open: O, close: C) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError> + Send + 'static,
        E2: Into<BoxError> + Send + 'static,
        O: Fn(Arguments) -> OFut + Send + Sync + 'static,
        OFut: Future<Output = Result<T, E>> + Send + 'static,
        C: Fn(Arc<T>) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = Result<(), E2>> + Send + 'static,
    {
        Self::from_resource(params, AsyncGenerator::new(open, close)).produces::<T>()
    }

    /// Provider backed by a [`Factory`] implementation.
    pub fn from_factory(params: ParamList, factory: impl Factory) -> Self {
        Self::with_kind(ProviderKind::Factory(Arc::new(factory)), params, None)
    }

    /// Provider backed by a [`Resource`] implementation.
    pub fn from_resource(params: ParamList, resource: impl Resource) -> Self {
        Self::with_kind(ProviderKind::Generator(Arc::new(resource)), params, None)
    }

    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = Some(cache_mode);
        self
    }

    /// Shorthand for [`CacheMode::Singleton`].
    pub fn singleton(self) -> Self {
        self.with_cache_mode(CacheMode::Singleton)
    }

    /// Shorthand for [`CacheMode::None`].
    pub fn uncached(self) -> Self {
        self.with_cache_mode(CacheMode::None)
    }

    /// Sets `depends_on` explicitly instead of deriving it from the parameter
    /// table.
    pub fn depends_on<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<DependencyKey>,
    {
        self.depends_on = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Declares the produced type; a value of another type fails resolution
    /// with `TypeMismatch`.
    pub fn produces<T: 'static>(mut self) -> Self {
        self.produces = Some(TypeTag::of::<T>());
        self
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }

    /// Effective cache mode; [`CacheMode::PerRequest`] unless set.
    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode.unwrap_or_default()
    }

    /// Applies the container default when no mode was set explicitly.
    pub(crate) fn or_cache_mode(mut self, default: CacheMode) -> Self {
        self.cache_mode.get_or_insert(default);
        self
    }

    pub fn produced_type(&self) -> Option<TypeTag> {
        self.produces
    }

    pub fn explicit_depends_on(&self) -> Option<&[DependencyKey]> {
        self.depends_on.as_deref()
    }

    pub fn is_generator(&self) -> bool {
        matches!(self.kind, ProviderKind::Generator(_))
    }

    /// Effective `depends_on`: the explicit list if set, otherwise the keys
    /// derived from the parameter table.
    pub fn dependency_keys<F>(&self, binder: &ParameterBinder, is_provided: F) -> Vec<DependencyKey>
    where
        F: Fn(&DependencyKey) -> bool,
    {
        match &self.depends_on {
            Some(keys) => keys.clone(),
            None => binder.dependency_keys(&self.params, is_provided),
        }
    }

    /// Invokes the provider. Generators also hand back their teardown.
    pub(crate) async fn instantiate(&self, key: &DependencyKey, args: Arguments) -> DiResult<Instance> {
        match &self.kind {
            ProviderKind::Value(value) => Ok(Instance {
                value: value.clone(),
                teardown: None,
            }),
            ProviderKind::Factory(factory) => {
                let value = factory
                    .create(args)
                    .await
                    .map_err(|e| ResolutionError::provider_failed(key, e))?;
                Ok(Instance { value, teardown: None })
            }
            ProviderKind::Generator(resource) => {
                let value = resource
                    .open(args)
                    .await
                    .map_err(|e| ResolutionError::provider_failed(key, e))?;
                let resource = resource.clone();
                let opened = value.clone();
                let teardown = CleanupAction::new(key.clone(), move || async move {
                    resource.close(opened).await
                });
                Ok(Instance {
                    value,
                    teardown: Some(teardown),
                })
            }
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("kind", &self.kind)
            .field("params", &self.params.names().collect::<Vec<_>>())
            .field("depends_on", &self.depends_on)
            .field("cache_mode", &self.cache_mode)
            .field("produces", &self.produces)
            .finish()
    }
}

/// A freshly produced value and, for generators, its teardown.
pub(crate) struct Instance {
    pub(crate) value: ResolvedValue,
    pub(crate) teardown: Option<CleanupAction>,
}

// ===== Closure adapters =====

struct SyncFactory<F, T> {
    factory: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> SyncFactory<F, T> {
    fn new(factory: F) -> Self {
        Self {
            factory,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, T, E> Factory for SyncFactory<F, T>
where
    T: Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
    F: Fn(Arguments) -> Result<T, E> + Send + Sync + 'static,
{
    async fn create(&self, args: Arguments) -> Result<ResolvedValue, BoxError> {
        (self.factory)(args).map(ResolvedValue::new).map_err(Into::into)
    }
}

struct AsyncFnFactory<F, T> {
    factory: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> AsyncFnFactory<F, T> {
    fn new(factory: F) -> Self {
        Self {
            factory,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, T, E> Factory for AsyncFnFactory<F, T>
where
    T: Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    async fn create(&self, args: Arguments) -> Result<ResolvedValue, BoxError> {
        (self.factory)(args).await.map(ResolvedValue::new).map_err(Into::into)
    }
}

fn downcast_opened<T: Send + Sync + 'static>(value: &ResolvedValue) -> Result<Arc<T>, BoxError> {
    value.downcast::<T>().ok_or_else(|| {
        format!(
            "resource expected {}, got {}",
            std::any::type_name::<T>(),
            value.type_name()
        )
        .into()
    })
}

struct SyncGenerator<O, C, T> {
    open: O,
    close: C,
    _marker: PhantomData<fn() -> T>,
}

impl<O, C, T> SyncGenerator<O, C, T> {
    fn new(open: O, close: C) -> Self {
        Self {
            open,
            close,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<O, C, T, E, E2> Resource for SyncGenerator<O, C, T>
where
    T: Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
    E2: Into<BoxError> + Send + 'static,
    O: Fn(Arguments) -> Result<T, E> + Send + Sync + 'static,
    C: Fn(Arc<T>) -> Result<(), E2> + Send + Sync + 'static,
{
    async fn open(&self, args: Arguments) -> Result<ResolvedValue, BoxError> {
        (self.open)(args).map(ResolvedValue::new).map_err(Into::into)
    }

    async fn close(&self, value: ResolvedValue) -> Result<(), BoxError> {
        let value = downcast_opened::<T>(&value)?;
        (self.close)(value).map_err(Into::into)
    }
}

struct AsyncGenerator<O, C, T> {
    open: O,
    close: C,
    _marker: PhantomData<fn() -> T>,
}

impl<O, C, T> AsyncGenerator<O, C, T> {
    fn new(open: O, close: C) -> Self {
        Self {
            open,
            close,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<O, OFut, C, CFut, T, E, E2> Resource for AsyncGenerator<O, C, T>
where
    T: Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
    E2: Into<BoxError> + Send + 'static,
    O: Fn(Arguments) -> OFut + Send + Sync + 'static,
    OFut: Future<Output = Result<T, E>> + Send + 'static,
    C: Fn(Arc<T>) -> CFut + Send + Sync + 'static,
    CFut: Future<Output = Result<(), E2>> + Send + 'static,
{
    async fn open(&self, args: Arguments) -> Result<ResolvedValue, BoxError> {
        (self.open)(args).await.map(ResolvedValue::new).map_err(Into::into)
    }

    async fn close(&self, value: ResolvedValue) -> Result<(), BoxError> {
        let value = downcast_opened::<T>(&value)?;
        (self.close)(value).await.map_err(Into::into)
    }
}
