//! Dependency key types for provider storage and lookup.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Key under which a provider is registered and looked up.
///
/// A key is either a plain name (the common case for handler parameters such
/// as `db` or `settings`) or a Rust type. Named keys compare by string, type
/// keys compare by `TypeId` only; the stored type name is for diagnostics.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::DependencyKey;
///
/// struct DatabasePool;
///
/// let by_name = DependencyKey::named("db");
/// let by_type = DependencyKey::of::<DatabasePool>();
///
/// assert_eq!(by_name, DependencyKey::from("db"));
/// assert_eq!(by_name.name(), Some("db"));
/// assert!(by_type.type_id().is_some());
/// assert_ne!(by_name, by_type);
/// ```
#[derive(Clone)]
pub enum DependencyKey {
    /// Name-based key, matched against call-site parameter names
    Name(Arc<str>),
    /// Type-based key, matched against call-site parameter type tags
    Type(TypeId, &'static str),
}

impl DependencyKey {
    /// Creates a named key.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        DependencyKey::Name(name.into())
    }

    /// Creates a type key for `T`.
    #[inline]
    pub fn of<T: 'static + ?Sized>() -> Self {
        DependencyKey::Type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Creates a type key from a [`TypeTag`].
    pub fn from_tag(tag: TypeTag) -> Self {
        DependencyKey::Type(tag.id, tag.name)
    }

    /// Returns the name for named keys.
    pub fn name(&self) -> Option<&str> {
        match self {
            DependencyKey::Name(name) => Some(name),
            DependencyKey::Type(..) => None,
        }
    }

    /// Returns the `TypeId` for type keys.
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            DependencyKey::Name(_) => None,
            DependencyKey::Type(id, _) => Some(*id),
        }
    }

    /// Human-readable form used in errors and logs.
    pub fn display_name(&self) -> &str {
        match self {
            DependencyKey::Name(name) => name,
            DependencyKey::Type(_, name) => name,
        }
    }
}

impl PartialEq for DependencyKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DependencyKey::Name(a), DependencyKey::Name(b)) => a == b,
            // TypeId only, the name is diagnostic
            (DependencyKey::Type(a, _), DependencyKey::Type(b, _)) => a == b,
            _ => false,
        }
    }
}

impl Eq for DependencyKey {}

impl std::hash::Hash for DependencyKey {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            DependencyKey::Name(name) => {
                0u8.hash(state);
                name.hash(state);
            }
            DependencyKey::Type(id, _) => {
                1u8.hash(state);
                id.hash(state);
            }
        }
    }
}

impl PartialOrd for DependencyKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DependencyKey {
    /// Names sort before types; types sort by display name so batch ordering
    /// is stable across runs.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        match (self, other) {
            (DependencyKey::Name(a), DependencyKey::Name(b)) => a.cmp(b),
            (DependencyKey::Name(_), DependencyKey::Type(..)) => Ordering::Less,
            (DependencyKey::Type(..), DependencyKey::Name(_)) => Ordering::Greater,
            (DependencyKey::Type(a, name_a), DependencyKey::Type(b, name_b)) => {
                name_a.cmp(name_b).then_with(|| a.cmp(b))
            }
        }
    }
}

impl fmt::Debug for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKey::Name(name) => write!(f, "Name({name:?})"),
            DependencyKey::Type(_, name) => write!(f, "Type({name})"),
        }
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl From<&str> for DependencyKey {
    fn from(name: &str) -> Self {
        DependencyKey::named(name)
    }
}

impl From<String> for DependencyKey {
    fn from(name: String) -> Self {
        DependencyKey::named(name)
    }
}

impl From<TypeTag> for DependencyKey {
    fn from(tag: TypeTag) -> Self {
        DependencyKey::from_tag(tag)
    }
}

/// Runtime type tag used for structural type checks at binding time.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for `T`.
    #[inline]
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Two tags are compatible when they denote the same concrete type.
    #[inline]
    pub fn is_compatible(&self, other: &TypeTag) -> bool {
        self.id == other.id
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identifier of a route (or any other call-site group) that can carry
/// provider overrides.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(Arc<str>);

impl RouteId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteId({:?})", &*self.0)
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RouteId {
    fn from(id: &str) -> Self {
        RouteId::new(id)
    }
}

impl From<String> for RouteId {
    fn from(id: String) -> Self {
        RouteId::new(id)
    }
}
