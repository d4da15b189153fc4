//! Provider cache modes.

/// Cache mode controlling how long a provider's value is reused.
///
/// # Characteristics
///
/// - **Singleton**: created once per container, shared by every request
/// - **PerRequest**: created once per request scope, shared inside it
/// - **None**: created on every resolution pass (still shared within one pass,
///   so a diamond-shaped graph builds the value once)
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::CacheMode;
///
/// assert_eq!(CacheMode::default(), CacheMode::PerRequest);
/// assert_eq!(CacheMode::from_flags(true, false), CacheMode::Singleton);
/// assert_eq!(CacheMode::from_flags(false, false), CacheMode::None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CacheMode {
    /// Never cached across resolution passes
    None,
    /// Cached for the lifetime of one request scope
    #[default]
    PerRequest,
    /// Cached for the lifetime of the container
    Singleton,
}

impl CacheMode {
    /// Maps the legacy `singleton` / `cacheable` flag pair onto a mode.
    ///
    /// `singleton` wins when both are set.
    pub fn from_flags(singleton: bool, cacheable: bool) -> Self {
        match (singleton, cacheable) {
            (true, _) => CacheMode::Singleton,
            (false, true) => CacheMode::PerRequest,
            (false, false) => CacheMode::None,
        }
    }

    pub fn is_singleton(self) -> bool {
        self == CacheMode::Singleton
    }
}

impl std::fmt::Display for CacheMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CacheMode::None => "none",
            CacheMode::PerRequest => "per_request",
            CacheMode::Singleton => "singleton",
        })
    }
}
