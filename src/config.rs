//! Container configuration.

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::binder::{ParameterBinder, DEFAULT_RESERVED_NAMES};
use crate::cache_mode::CacheMode;

/// Default limit on nested resolution depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Settings of a [`DependencyContainer`](crate::DependencyContainer).
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::{CacheMode, ContainerConfig, DependencyContainer};
///
/// let config = ContainerConfig::default()
///     .reserved_names(["request", "response", "ctx"])
///     .default_cache_mode(CacheMode::None)
///     .max_depth(16);
///
/// let container = DependencyContainer::with_config(config);
/// assert_eq!(container.config().max_depth, 16);
/// ```
///
/// With the `config` feature the configuration can be loaded from JSON:
///
/// ```rust
/// # #[cfg(feature = "config")]
/// # {
/// use ferrous_depends::{CacheMode, ContainerConfig};
///
/// let config = ContainerConfig::from_json_str(r#"{ "max_depth": 8, "default_cache_mode": "singleton" }"#).unwrap();
/// assert_eq!(config.max_depth, 8);
/// assert_eq!(config.default_cache_mode, CacheMode::Singleton);
/// assert!(config.reserved_names.iter().any(|n| n == "request"));
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerConfig {
    /// Parameter names supplied by the dispatcher, never resolved from providers
    pub reserved_names: Vec<String>,
    /// Cache mode of providers registered without an explicit one
    pub default_cache_mode: CacheMode,
    /// Maximum nesting of one resolution pass
    pub max_depth: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            reserved_names: DEFAULT_RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
            default_cache_mode: CacheMode::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ContainerConfig {
    pub fn reserved_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_cache_mode(mut self, mode: CacheMode) -> Self {
        self.default_cache_mode = mode;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Parses a JSON document; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub(crate) fn binder(&self) -> ParameterBinder {
        ParameterBinder::new(self.reserved_names.iter().map(String::as_str))
    }
}
