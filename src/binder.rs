//! Call-site parameter tables and the binding of resolved values to them.
//!
//! Call sites (handlers, lifecycle hooks and provider factories alike) declare
//! an explicit [`ParamList`] once, at registration time. The
//! [`ParameterBinder`] then maps resolved dependencies onto that table:
//!
//! 1. exact name match against resolved or special (framework-injected) values
//! 2. for typed parameters, the first resolved value of a compatible type, in
//!    resolution order
//! 3. the declared default, if any
//!
//! A required parameter matching none of these is a missing dependency.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{DiResult, ResolutionError};
use crate::key::{DependencyKey, TypeTag};
use crate::value::ResolvedValue;

/// Default names supplied by the dispatcher rather than by providers.
pub const DEFAULT_RESERVED_NAMES: &[&str] = &["self", "cls", "request", "response"];

/// A single declared parameter.
#[derive(Debug, Clone)]
pub struct Param {
    name: Arc<str>,
    type_tag: Option<TypeTag>,
    required: bool,
    default: Option<ResolvedValue>,
}

impl Param {
    /// Required, untyped parameter.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            type_tag: None,
            required: true,
            default: None,
        }
    }

    /// Required parameter annotated with type `T`.
    pub fn typed<T: 'static>(name: impl Into<Arc<str>>) -> Self {
        Self {
            type_tag: Some(TypeTag::of::<T>()),
            ..Self::new(name)
        }
    }

    /// Makes the parameter optional with a default value.
    pub fn with_default<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.default = Some(ResolvedValue::new(value));
        self.required = false;
        self
    }

    /// Makes the parameter optional without a default; it is left out of the
    /// argument map when nothing matches.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> Option<TypeTag> {
        self.type_tag
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    fn name_key(&self) -> DependencyKey {
        DependencyKey::Name(self.name.clone())
    }
}

/// Ordered parameter table of a call site.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::{Param, ParamList};
///
/// struct DatabasePool;
///
/// let params = ParamList::new()
///     .param("request")
///     .typed::<DatabasePool>("db")
///     .with(Param::new("page_size").with_default(50u32));
///
/// assert_eq!(params.len(), 3);
/// assert_eq!(params.names().collect::<Vec<_>>(), vec!["request", "db", "page_size"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParamList {
    params: Vec<Param>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a required, untyped parameter.
    pub fn param(self, name: impl Into<Arc<str>>) -> Self {
        self.with(Param::new(name))
    }

    /// Appends a required parameter of type `T`.
    pub fn typed<T: 'static>(self, name: impl Into<Arc<str>>) -> Self {
        self.with(Param::typed::<T>(name))
    }

    /// Appends a fully configured parameter.
    pub fn with(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.params.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(Param::name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromIterator<Param> for ParamList {
    fn from_iter<I: IntoIterator<Item = Param>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ParamList {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

/// Values produced by one resolution, kept in resolution order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDependencies {
    entries: Vec<(DependencyKey, ResolvedValue)>,
}

impl ResolvedDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value; a key already present keeps its first value.
    pub fn insert(&mut self, key: DependencyKey, value: ResolvedValue) {
        if !self.contains(&key) {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &DependencyKey) -> Option<&ResolvedValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Typed lookup; `None` when absent or of another type.
    pub fn get_as<T: Send + Sync + 'static>(&self, key: &DependencyKey) -> Option<Arc<T>> {
        self.get(key).and_then(ResolvedValue::downcast::<T>)
    }

    pub fn contains(&self, key: &DependencyKey) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &DependencyKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DependencyKey, &ResolvedValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Framework-injected values (the request, the response, ...) supplied by the
/// dispatcher instead of a provider.
#[derive(Debug, Clone, Default)]
pub struct SpecialValues {
    values: Vec<(Arc<str>, ResolvedValue)>,
}

impl SpecialValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a special value, replacing any previous value of the same name.
    pub fn insert<T: Send + Sync + 'static>(&mut self, name: impl Into<Arc<str>>, value: T) {
        self.insert_value(name, ResolvedValue::new(value));
    }

    pub fn insert_value(&mut self, name: impl Into<Arc<str>>, value: ResolvedValue) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedValue> {
        self.values.iter().find(|(n, _)| &**n == name).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Argument map handed to a handler or provider, in parameter order.
///
/// # Examples
///
/// ```rust
/// use ferrous_depends::{
///     ParamList, ParameterBinder, ResolvedDependencies, ResolvedValue, SpecialValues,
/// };
///
/// let params = ParamList::new().typed::<u16>("port");
/// let mut resolved = ResolvedDependencies::new();
/// resolved.insert("port".into(), ResolvedValue::new(8080u16));
///
/// let binder = ParameterBinder::default();
/// let args = binder.bind(&params, &resolved, &SpecialValues::new()).unwrap();
/// assert_eq!(*args.get::<u16>("port").unwrap(), 8080);
/// assert!(args.get::<String>("port").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    entries: Vec<(Arc<str>, ResolvedValue)>,
}

impl Arguments {
    /// Typed argument. Absent arguments are `MissingDependency`, arguments of
    /// another type are `TypeMismatch`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> DiResult<Arc<T>> {
        let value = self.value(name).ok_or_else(|| ResolutionError::MissingDependency {
            key: DependencyKey::named(name),
        })?;
        value.downcast::<T>().ok_or_else(|| ResolutionError::TypeMismatch {
            key: DependencyKey::named(name),
            expected: std::any::type_name::<T>(),
            actual: value.type_name(),
        })
    }

    /// Untyped argument.
    pub fn value(&self, name: &str) -> Option<&ResolvedValue> {
        self.entries.iter().find(|(n, _)| &**n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| &**n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedValue)> {
        self.entries.iter().map(|(n, v)| (&**n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Matches resolved values to declared parameters.
#[derive(Debug, Clone)]
pub struct ParameterBinder {
    reserved: HashSet<Arc<str>>,
}

impl Default for ParameterBinder {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVED_NAMES.iter().copied())
    }
}

impl ParameterBinder {
    /// Creates a binder with the given reserved (framework-injected) names.
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self {
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Keys that must be resolved to satisfy `params`.
    ///
    /// Reserved names are skipped. A parameter maps to its name key when that
    /// is provided, otherwise to its type key when typed and provided. A
    /// required parameter with neither maps to its name key, which fails as a
    /// missing dependency at resolution time; an optional one is skipped.
    pub fn dependency_keys<F>(&self, params: &ParamList, is_provided: F) -> Vec<DependencyKey>
    where
        F: Fn(&DependencyKey) -> bool,
    {
        let mut keys: Vec<DependencyKey> = Vec::with_capacity(params.len());
        for param in params {
            if self.is_reserved(param.name()) {
                continue;
            }
            let name_key = param.name_key();
            let key = if is_provided(&name_key) {
                Some(name_key)
            } else if let Some(type_key) = param
                .type_tag()
                .map(DependencyKey::from_tag)
                .filter(|k| is_provided(k))
            {
                Some(type_key)
            } else if param.is_required() {
                Some(name_key)
            } else {
                None
            };
            if let Some(key) = key {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Builds the argument map for `params`.
    pub fn bind(
        &self,
        params: &ParamList,
        resolved: &ResolvedDependencies,
        special: &SpecialValues,
    ) -> DiResult<Arguments> {
        let mut args = Arguments::default();

        for param in params {
            let name_key = param.name_key();
            let by_name = if self.is_reserved(param.name()) {
                special.get(param.name())
            } else {
                resolved.get(&name_key).or_else(|| special.get(param.name()))
            };

            let value = match (by_name, param.type_tag()) {
                (Some(value), Some(expected)) if !value.type_tag().is_compatible(&expected) => {
                    return Err(ResolutionError::TypeMismatch {
                        key: name_key,
                        expected: expected.name(),
                        actual: value.type_name(),
                    });
                }
                (Some(value), _) => Some(value.clone()),
                (None, Some(expected)) => resolved
                    .iter()
                    .map(|(_, v)| v)
                    .find(|v| v.type_tag().is_compatible(&expected))
                    .cloned(),
                (None, None) => None,
            };

            match value.or_else(|| param.default.clone()) {
                Some(value) => args.entries.push((param.name.clone(), value)),
                None if param.is_required() => {
                    return Err(ResolutionError::MissingDependency { key: name_key });
                }
                None => {}
            }
        }

        Ok(args)
    }
}
