//! Type-erased resolved values.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::key::TypeTag;

// Type-erased Arc for storage
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// An opaque, shareable dependency value together with its runtime type tag.
///
/// Cloning is cheap (one `Arc` increment) and clones share identity, which is
/// what the singleton and per-request caches hand out.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::ResolvedValue;
///
/// let value = ResolvedValue::new(String::from("postgres://localhost"));
/// let copy = value.clone();
///
/// assert!(value.is::<String>());
/// assert!(value.ptr_eq(&copy));
/// assert_eq!(value.downcast::<String>().unwrap().as_str(), "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct ResolvedValue {
    value: AnyArc,
    tag: TypeTag,
}

impl ResolvedValue {
    /// Wraps a value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an existing `Arc` without re-allocating.
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value,
            tag: TypeTag::of::<T>(),
        }
    }

    /// Runtime type of the wrapped value.
    pub fn type_tag(&self) -> TypeTag {
        self.tag
    }

    pub fn type_name(&self) -> &'static str {
        self.tag.name()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.tag.is_compatible(&TypeTag::of::<T>())
    }

    /// Typed view of the value, or `None` if the type differs.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// Whether two values are the same instance.
    pub fn ptr_eq(&self, other: &ResolvedValue) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedValue")
            .field("type", &self.tag.name())
            .finish()
    }
}
