//! Internal implementation details.

pub(crate) mod resolution_path;

pub(crate) use resolution_path::ResolutionPath;

use crate::key::DependencyKey;

#[cfg(feature = "ahash")]
pub(crate) type FastMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
#[cfg(not(feature = "ahash"))]
pub(crate) type FastMap<K, V> = std::collections::HashMap<K, V>;

#[cfg(feature = "ahash")]
pub(crate) type KeySet = std::collections::HashSet<DependencyKey, ahash::RandomState>;
#[cfg(not(feature = "ahash"))]
pub(crate) type KeySet = std::collections::HashSet<DependencyKey>;

pub(crate) type KeyMap<V> = FastMap<DependencyKey, V>;
