//! Error types for the dependency resolution engine.

use std::fmt;

use thiserror::Error;

use crate::key::{DependencyKey, RouteId};

/// Boxed error returned by provider code (factories, resource open/close).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Scope at which a provider is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderScope {
    /// Application-wide registration
    App,
    /// Route-level override shadowing the application registration
    Route(RouteId),
}

impl fmt::Display for ProviderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderScope::App => f.write_str("app"),
            ProviderScope::Route(route) => write!(f, "route '{route}'"),
        }
    }
}

/// Errors raised while registering providers or resolving dependencies.
///
/// Every variant except [`ResolutionError::DuplicateProvider`] and
/// [`ResolutionError::CaptiveDependency`] can surface at resolution time and
/// aborts the current resolution pass; no partial argument map is ever handed
/// to a handler. The routing layer is expected to render
/// these as a server-side failure.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::{DependencyKey, ErrorKind, ResolutionError};
///
/// let err = ResolutionError::CircularDependency {
///     cycle: vec!["a".into(), "b".into(), "a".into()],
/// };
/// assert_eq!(err.kind(), ErrorKind::CircularDependency);
/// assert_eq!(err.to_string(), "Circular dependency: a -> b -> a");
/// assert_eq!(err.cycle().map(|c| c.len()), Some(3));
///
/// let missing = ResolutionError::MissingDependency { key: DependencyKey::named("db") };
/// assert_eq!(missing.keys(), vec![&DependencyKey::named("db")]);
/// ```
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The dependency graph contains a cycle (full path, first == last)
    #[error("Circular dependency: {}", join_keys(.cycle))]
    CircularDependency { cycle: Vec<DependencyKey> },

    /// No provider registered for a required key
    #[error("Dependency not found: {key}")]
    MissingDependency { key: DependencyKey },

    /// Key already registered at the same scope
    #[error("Duplicate provider for {key} at {scope} scope")]
    DuplicateProvider { key: DependencyKey, scope: ProviderScope },

    /// Produced value does not match the declared consumer type
    #[error("Type mismatch for {key}: expected {expected}, got {actual}")]
    TypeMismatch {
        key: DependencyKey,
        expected: &'static str,
        actual: &'static str,
    },

    /// Factory or resource `open` returned an error
    #[error("Provider for {key} failed: {source}")]
    ProviderFailed {
        key: DependencyKey,
        #[source]
        source: BoxError,
    },

    /// Resolution nested deeper than the configured limit
    #[error("Max resolution depth {depth} exceeded")]
    DepthExceeded { depth: usize },

    /// A singleton depends on a generator that is closed at request end
    #[error("Singleton {key} depends on request-scoped resource {dependency}")]
    CaptiveDependency {
        key: DependencyKey,
        dependency: DependencyKey,
    },
}

/// Discriminant of a [`ResolutionError`], convenient for matching and for
/// mapping errors onto transport responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CircularDependency,
    MissingDependency,
    DuplicateProvider,
    TypeMismatch,
    ProviderFailed,
    DepthExceeded,
    CaptiveDependency,
}

impl ResolutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolutionError::CircularDependency { .. } => ErrorKind::CircularDependency,
            ResolutionError::MissingDependency { .. } => ErrorKind::MissingDependency,
            ResolutionError::DuplicateProvider { .. } => ErrorKind::DuplicateProvider,
            ResolutionError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            ResolutionError::ProviderFailed { .. } => ErrorKind::ProviderFailed,
            ResolutionError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            ResolutionError::CaptiveDependency { .. } => ErrorKind::CaptiveDependency,
        }
    }

    /// The offending key(s). For cycles this is the full cycle path.
    pub fn keys(&self) -> Vec<&DependencyKey> {
        match self {
            ResolutionError::CircularDependency { cycle } => cycle.iter().collect(),
            ResolutionError::MissingDependency { key }
            | ResolutionError::DuplicateProvider { key, .. }
            | ResolutionError::TypeMismatch { key, .. }
            | ResolutionError::ProviderFailed { key, .. } => vec![key],
            ResolutionError::DepthExceeded { .. } => Vec::new(),
            ResolutionError::CaptiveDependency { key, dependency } => vec![key, dependency],
        }
    }

    /// The cycle path, for [`ResolutionError::CircularDependency`].
    pub fn cycle(&self) -> Option<&[DependencyKey]> {
        match self {
            ResolutionError::CircularDependency { cycle } => Some(cycle),
            _ => None,
        }
    }

    pub(crate) fn provider_failed(key: &DependencyKey, source: impl Into<BoxError>) -> Self {
        ResolutionError::ProviderFailed {
            key: key.clone(),
            source: source.into(),
        }
    }
}

fn join_keys(keys: &[DependencyKey]) -> String {
    keys.iter()
        .map(DependencyKey::display_name)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A teardown that failed while draining a cleanup stack.
///
/// Cleanup failures never abort anything: they are collected and reported
/// alongside the request's primary outcome.
#[derive(Debug, Error)]
#[error("Cleanup of {key} failed: {source}")]
pub struct CleanupFailure {
    pub key: DependencyKey,
    #[source]
    pub source: BoxError,
}

/// Failure of a request run through
/// [`DependencyContainer::run_request`](crate::DependencyContainer::run_request).
#[derive(Debug, Error)]
pub enum RequestError<E> {
    /// Dependencies could not be resolved; the handler was not called
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// The handler ran and returned an error
    #[error("Handler failed: {0}")]
    Handler(E),
}

impl<E> RequestError<E> {
    pub fn resolution(&self) -> Option<&ResolutionError> {
        match self {
            RequestError::Resolution(err) => Some(err),
            RequestError::Handler(_) => None,
        }
    }
}

/// Result type for registration and resolution operations.
pub type DiResult<T> = Result<T, ResolutionError>;
