//! Observation hooks for resolution and teardown events.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::{CleanupFailure, ResolutionError};
use crate::key::DependencyKey;

/// Observer trait for resolution events.
///
/// Observers are registered on the container with
/// [`DependencyContainer::add_observer`](crate::DependencyContainer::add_observer)
/// and are called synchronously from the resolver. Keep implementations
/// lightweight.
///
/// `resolving`/`resolved` fire only when a provider is actually invoked; cache
/// hits are silent.
///
/// # Examples
///
/// ```
/// use ferrous_depends::{DependencyContainer, DependencyKey, ResolutionObserver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct CountingObserver {
///     created: AtomicUsize,
/// }
///
/// impl ResolutionObserver for CountingObserver {
///     fn resolving(&self, _key: &DependencyKey) {}
///
///     fn resolved(&self, _key: &DependencyKey, _duration: Duration) {
///         self.created.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let mut container = DependencyContainer::new();
/// container.add_observer(Arc::new(CountingObserver::default()));
/// ```
pub trait ResolutionObserver: Send + Sync {
    /// Called before a provider is invoked.
    fn resolving(&self, key: &DependencyKey);

    /// Called after a provider produced its value.
    fn resolved(&self, key: &DependencyKey, duration: Duration);

    /// Called when resolving `key` failed. The error still propagates.
    fn failed(&self, key: &DependencyKey, error: &ResolutionError) {
        let _ = (key, error);
    }

    /// Called for every teardown that failed while draining a cleanup stack.
    fn cleanup_failed(&self, failure: &CleanupFailure) {
        let _ = failure;
    }
}

/// Registered observers. Empty by default, in which case notification is a
/// length check.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ResolutionObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn ResolutionObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    #[inline]
    pub(crate) fn resolving(&self, key: &DependencyKey) {
        for observer in &self.observers {
            observer.resolving(key);
        }
    }

    #[inline]
    pub(crate) fn resolved(&self, key: &DependencyKey, duration: Duration) {
        for observer in &self.observers {
            observer.resolved(key, duration);
        }
    }

    pub(crate) fn failed(&self, key: &DependencyKey, error: &ResolutionError) {
        for observer in &self.observers {
            observer.failed(key, error);
        }
    }

    pub(crate) fn cleanup_failed(&self, failures: &[CleanupFailure]) {
        for failure in failures {
            for observer in &self.observers {
                observer.cleanup_failed(failure);
            }
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.observers.len())
            .finish()
    }
}

/// Built-in observer that emits `tracing` events.
///
/// # Examples
///
/// ```
/// use ferrous_depends::{DependencyContainer, TracingObserver};
/// use std::sync::Arc;
///
/// let mut container = DependencyContainer::new();
/// container.add_observer(Arc::new(TracingObserver::with_label("orders-api")));
/// ```
#[derive(Debug, Clone)]
pub struct TracingObserver {
    label: String,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::with_label("ferrous-depends")
    }

    /// Observer whose events carry `label` in their `container` field.
    pub fn with_label(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionObserver for TracingObserver {
    fn resolving(&self, key: &DependencyKey) {
        trace!(container = %self.label, key = %key, "resolving");
    }

    fn resolved(&self, key: &DependencyKey, duration: Duration) {
        debug!(container = %self.label, key = %key, elapsed_us = duration.as_micros() as u64, "resolved");
    }

    fn failed(&self, key: &DependencyKey, error: &ResolutionError) {
        warn!(container = %self.label, key = %key, error = %error, "resolution failed");
    }

    fn cleanup_failed(&self, failure: &CleanupFailure) {
        warn!(container = %self.label, key = %failure.key, error = %failure.source, "cleanup failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl ResolutionObserver for Recording {
        fn resolving(&self, key: &DependencyKey) {
            self.events.lock().push(format!("resolving {key}"));
        }

        fn resolved(&self, key: &DependencyKey, _duration: Duration) {
            self.events.lock().push(format!("resolved {key}"));
        }
    }

    #[test]
    fn observers_are_notified_in_registration_order() {
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());
        let mut observers = Observers::default();
        assert!(!observers.has_observers());
        observers.add(first.clone());
        observers.add(second.clone());

        let key = DependencyKey::named("db");
        observers.resolving(&key);
        observers.resolved(&key, Duration::from_millis(1));
        // default no-op
        observers.failed(&key, &ResolutionError::MissingDependency { key: key.clone() });

        assert_eq!(*first.events.lock(), vec!["resolving db", "resolved db"]);
        assert_eq!(first.events.lock().len(), second.events.lock().len());
    }
}
