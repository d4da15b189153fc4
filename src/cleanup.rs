//! Ordered teardown of generator-backed resources.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{BoxError, CleanupFailure};
use crate::key::DependencyKey;

/// Future type for teardown operations.
pub(crate) type BoxTeardown = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

/// A single teardown step for the resource created under `key`.
pub struct CleanupAction {
    key: DependencyKey,
    teardown: Box<dyn FnOnce() -> BoxTeardown + Send>,
}

impl CleanupAction {
    /// Asynchronous teardown.
    pub fn new<F, Fut>(key: DependencyKey, teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            key,
            teardown: Box::new(move || Box::pin(teardown())),
        }
    }

    /// Synchronous teardown. Runs when the returned future is first polled.
    pub fn sync<F>(key: DependencyKey, teardown: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        Self::new(key, move || async move { teardown() })
    }

    pub fn key(&self) -> &DependencyKey {
        &self.key
    }

    /// Turns the action into its running future. A closure that panics while
    /// building the future yields a future that reports the panic.
    fn start(self) -> InFlight {
        let teardown = self.teardown;
        let future = std::panic::catch_unwind(AssertUnwindSafe(teardown)).unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            let failed: BoxTeardown = Box::pin(async move { Err::<(), BoxError>(message.into()) });
            failed
        });
        InFlight {
            key: self.key,
            future,
        }
    }
}

impl fmt::Debug for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupAction").field("key", &self.key).finish()
    }
}

/// A teardown that has started but not finished.
struct InFlight {
    key: DependencyKey,
    future: BoxTeardown,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("teardown panicked: {detail}")
}

/// LIFO stack of teardown actions.
///
/// Actions run in exactly the reverse order of their creation. A failing or
/// panicking teardown never stops the drain: every remaining action still
/// runs and the failures are returned to the caller.
///
/// Actions stay owned by the stack until they complete, including the one
/// currently being awaited. Dropping a `drain_reverse` future part way leaves
/// the unfinished work in the stack, so its owner can still run it.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::{CleanupAction, CleanupStack};
/// use std::sync::{Arc, Mutex};
///
/// # tokio_test_block_on(async {
/// let log = Arc::new(Mutex::new(Vec::new()));
/// let mut stack = CleanupStack::new();
/// for name in ["db", "cache", "session"] {
///     let log = log.clone();
///     stack.push(CleanupAction::sync(name.into(), move || {
///         log.lock().unwrap().push(name);
///         Ok(())
///     }));
/// }
///
/// let failures = stack.drain_reverse().await;
/// assert!(failures.is_empty());
/// assert_eq!(*log.lock().unwrap(), vec!["session", "cache", "db"]);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Default)]
pub struct CleanupStack {
    actions: Vec<CleanupAction>,
    in_flight: Option<InFlight>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: CleanupAction) {
        self.actions.push(action);
    }

    /// Pending actions, counting an interrupted one.
    pub fn len(&self) -> usize {
        self.actions.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every action, most recently pushed first, and returns the
    /// failures in the order they occurred. An action interrupted by an
    /// earlier, dropped drain is resumed first.
    pub async fn drain_reverse(&mut self) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();
        loop {
            if self.in_flight.is_none() {
                let Some(action) = self.actions.pop() else {
                    break;
                };
                debug!(key = %action.key, "running cleanup");
                self.in_flight = Some(action.start());
            }

            let outcome = match self.in_flight.as_mut() {
                Some(running) => AssertUnwindSafe(running.future.as_mut()).catch_unwind().await,
                None => continue,
            };
            let Some(InFlight { key, .. }) = self.in_flight.take() else {
                continue;
            };

            let source = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => source,
                Err(panic) => panic_message(panic.as_ref()).into(),
            };
            warn!(key = %key, error = %source, "cleanup failed");
            failures.push(CleanupFailure { key, source });
        }
        failures
    }

    /// Moves all actions out, leaving the stack empty.
    pub(crate) fn take(&mut self) -> CleanupStack {
        std::mem::take(self)
    }
}

impl fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupStack")
            .field("pending", &self.actions.len())
            .field("in_flight", &self.in_flight.as_ref().map(|r| &r.key))
            .finish()
    }
}
