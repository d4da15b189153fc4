//! Per-request resolution state.

use tracing::{debug, warn};

use crate::binder::SpecialValues;
use crate::cache::RequestCache;
use crate::cleanup::CleanupStack;
use crate::error::CleanupFailure;
use crate::key::DependencyKey;
use crate::value::ResolvedValue;

/// State owned exclusively by one request.
///
/// A `RequestScope` holds the per-request cache, the cleanup stack of the
/// generators opened during the request and the framework-injected special
/// values (`request`, `response`, ...). It is created by
/// [`DependencyContainer::begin_request_scope`](crate::DependencyContainer::begin_request_scope)
/// and consumed by
/// [`DependencyContainer::end_request_scope`](crate::DependencyContainer::end_request_scope).
///
/// # Lifetime Behavior
///
/// - **Singleton**: cached in the container, shared by every scope
/// - **PerRequest**: cached here, discarded when the scope ends
/// - **None**: never cached, only memoized within one resolution pass
///
/// Dropping a scope with pending teardown (for instance because the request
/// future was cancelled) hands the teardown to the current tokio runtime. Outside
/// a runtime the teardown cannot run and a warning is logged.
///
/// # Examples
///
/// ```
/// use ferrous_depends::DependencyContainer;
///
/// struct HttpRequest {
///     path: String,
/// }
///
/// let container = DependencyContainer::new();
/// let mut scope = container.begin_request_scope();
/// scope.provide_special("request", HttpRequest { path: "/users".into() });
///
/// assert!(scope.special_values().get("request").is_some());
/// assert_eq!(scope.pending_cleanups(), 0);
/// ```
pub struct RequestScope {
    id: u64,
    pub(crate) cache: RequestCache,
    pub(crate) cleanup: CleanupStack,
    pub(crate) special: SpecialValues,
}

impl RequestScope {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            cache: RequestCache::new(),
            cleanup: CleanupStack::new(),
            special: SpecialValues::new(),
        }
    }

    /// Container-unique id of this request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Supplies a framework-injected value, bound by parameter name.
    pub fn provide_special<T: Send + Sync + 'static>(&mut self, name: &str, value: T) {
        self.special.insert(name, value);
    }

    pub fn special_values(&self) -> &SpecialValues {
        &self.special
    }

    /// Per-request cached value for `key`, if resolved earlier in this request.
    pub fn cached(&self, key: &DependencyKey) -> Option<&ResolvedValue> {
        self.cache.get(key)
    }

    /// Number of teardown actions still waiting for the end of the request.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanup.len()
    }

    /// Drains the cleanup stack and releases the per-request cache.
    ///
    /// The actions are drained in place: if this future is dropped part way,
    /// whatever has not finished is still owned by the scope and is handed to
    /// the runtime by `Drop`.
    pub(crate) async fn close(mut self) -> Vec<CleanupFailure> {
        self.cache.clear();
        debug!(request_id = self.id, pending = self.cleanup.len(), "closing request scope");
        self.cleanup.drain_reverse().await
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.cleanup.is_empty() {
            return;
        }

        let mut stack = self.cleanup.take();
        let request_id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(request_id, pending = stack.len(), "request scope dropped, finishing cleanup in background");
                handle.spawn(async move {
                    let failures = stack.drain_reverse().await;
                    if !failures.is_empty() {
                        warn!(request_id, failed = failures.len(), "background cleanup had failures");
                    }
                });
            }
            Err(_) => {
                warn!(
                    request_id,
                    pending = stack.len(),
                    "request scope dropped outside a tokio runtime; teardown skipped"
                );
            }
        }
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("cached", &self.cache.len())
            .field("pending_cleanups", &self.cleanup.len())
            .finish()
    }
}
