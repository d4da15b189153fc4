//! # ferrous-depends
//!
//! Request-scoped dependency injection resolution for async services.
//!
//! ## Features
//!
//! - **Name and type keys**: providers are registered under a parameter name
//!   or a Rust type, and bound to call sites by name first, then by type
//! - **Three cache modes**: singleton, per-request and uncached
//! - **Route overrides**: a route can shadow any app-level provider without
//!   affecting other routes
//! - **Cycle detection**: cycles are rejected at registration with the full
//!   path, e.g. `a -> b -> a`
//! - **Guaranteed teardown**: generator-style resources are closed in reverse
//!   creation order when the request ends, whether the handler succeeded,
//!   failed or was cancelled
//! - **Create-once singletons**: concurrent first requests run a singleton's
//!   factory exactly once; a singleton that a route shadows, directly or through
//!   its dependencies, is cached separately for that route
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_depends::{DependencyContainer, ParamList, Provider};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let mut container = DependencyContainer::new();
//! container
//!     .register("db".into(), Provider::value(Database { url: "postgres://localhost".into() }))
//!     .unwrap();
//! container
//!     .register(
//!         "users".into(),
//!         Provider::factory(ParamList::new().typed::<Database>("db"), |args| {
//!             Ok::<_, ferrous_depends::ResolutionError>(UserService { db: args.get("db")? })
//!         }),
//!     )
//!     .unwrap();
//!
//! let handler_params = ParamList::new().param("request").typed::<UserService>("users");
//! let mut scope = container.begin_request_scope();
//! scope.provide_special("request", "GET /users");
//!
//! let args = container
//!     .resolve_for_call_site(&handler_params, None, &mut scope)
//!     .await
//!     .unwrap();
//! let users = args.get::<UserService>("users").unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//!
//! container.end_request_scope(scope).await;
//! # });
//! ```
//!
//! ## Cache Modes
//!
//! - **Singleton**: created once per container, released by
//!   [`DependencyContainer::shutdown`]
//! - **PerRequest** (default): created once per [`RequestScope`]
//! - **None**: created on every resolution pass
//!
//! ## Generators
//!
//! ```rust
//! use ferrous_depends::{DependencyContainer, ParamList, Provider};
//! use std::sync::{Arc, Mutex};
//!
//! struct Session(u32);
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let closed = Arc::new(Mutex::new(Vec::new()));
//! let log = closed.clone();
//!
//! let mut container = DependencyContainer::new();
//! container
//!     .register(
//!         "session".into(),
//!         Provider::generator(
//!             ParamList::new(),
//!             |_| Ok::<_, std::io::Error>(Session(7)),
//!             move |session: Arc<Session>| {
//!                 log.lock().unwrap().push(session.0);
//!                 Ok::<_, std::io::Error>(())
//!             },
//!         ),
//!     )
//!     .unwrap();
//!
//! let mut scope = container.begin_request_scope();
//! container
//!     .resolve(&["session".into()], None, &mut scope)
//!     .await
//!     .unwrap();
//! assert_eq!(scope.pending_cleanups(), 1);
//!
//! let failures = container.end_request_scope(scope).await;
//! assert!(failures.is_empty());
//! assert_eq!(*closed.lock().unwrap(), vec![7]);
//! # });
//! ```

// Module declarations
pub mod binder;
pub mod cache;
pub mod cache_mode;
pub mod cleanup;
pub mod config;
pub mod container;
pub mod error;
pub mod graph;
pub mod key;
pub mod observer;
pub mod provider;
pub mod registry;
pub mod scope;
pub mod value;

mod internal;
mod resolver;

// Re-exports
pub use binder::{
    Arguments, Param, ParamList, ParameterBinder, ResolvedDependencies, SpecialValues,
    DEFAULT_RESERVED_NAMES,
};
pub use cache::{RequestCache, SingletonCache};
pub use cache_mode::CacheMode;
pub use cleanup::{CleanupAction, CleanupStack};
pub use config::{ContainerConfig, DEFAULT_MAX_DEPTH};
pub use container::{DependencyContainer, RequestOutcome};
pub use error::{
    BoxError, CleanupFailure, DiResult, ErrorKind, ProviderScope, RequestError, ResolutionError,
};
pub use graph::{DependencyGraph, GraphBuilder, GraphNode};
#[cfg(feature = "graph-export")]
pub use graph::{GraphSnapshot, NodeSnapshot};
pub use key::{DependencyKey, RouteId, TypeTag};
pub use observer::{ResolutionObserver, TracingObserver};
pub use provider::{Factory, Provider, ProviderKind, Resource};
pub use registry::ProviderRegistry;
pub use scope::RequestScope;
pub use value::ResolvedValue;

// Re-export for implementing `Factory` and `Resource`
pub use async_trait::async_trait;
