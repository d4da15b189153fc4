//! Dependency graph construction, cycle detection and export.
//!
//! The graph is an arena: nodes live in a `Vec` and edges are indices into it,
//! so there is no shared ownership between nodes. A graph is built for the app
//! scope or for one route's effective provider set (app providers shadowed by
//! that route's overrides).

use std::fmt::Write as _;

use crate::binder::ParameterBinder;
use crate::cache_mode::CacheMode;
use crate::error::{DiResult, ResolutionError};
use crate::internal::KeyMap;
use crate::key::{DependencyKey, RouteId};
use crate::provider::Provider;
use crate::registry::ProviderRegistry;

#[cfg(feature = "graph-export")]
use serde::{Deserialize, Serialize};

/// A node of the dependency graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    key: DependencyKey,
    dependencies: Vec<usize>,
    cache_mode: Option<CacheMode>,
}

impl GraphNode {
    pub fn key(&self) -> &DependencyKey {
        &self.key
    }

    /// Cache mode of the provider, or `None` for a key nothing provides.
    pub fn cache_mode(&self) -> Option<CacheMode> {
        self.cache_mode
    }

    pub fn is_registered(&self) -> bool {
        self.cache_mode.is_some()
    }
}

/// Acyclic dependency graph of one provider set.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: KeyMap<usize>,
    captive: Vec<(usize, usize)>,
}

impl DependencyGraph {
    fn intern(&mut self, key: &DependencyKey) -> usize {
        if let Some(&id) = self.index.get(key) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(GraphNode {
            key: key.clone(),
            dependencies: Vec::new(),
            cache_mode: None,
        });
        self.index.insert(key.clone(), id);
        id
    }

    pub fn node(&self, key: &DependencyKey) -> Option<&GraphNode> {
        self.index.get(key).map(|&id| &self.nodes[id])
    }

    pub fn contains(&self, key: &DependencyKey) -> bool {
        self.index.contains_key(key)
    }

    /// All keys, registered ones first in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &DependencyKey> {
        self.nodes.iter().map(|n| &n.key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of `key`, in `depends_on` order.
    pub fn dependencies_of(&self, key: &DependencyKey) -> Vec<&DependencyKey> {
        self.node(key)
            .map(|node| node.dependencies.iter().map(|&d| &self.nodes[d].key).collect())
            .unwrap_or_default()
    }

    /// Keys that depend directly on `key`.
    pub fn dependents_of(&self, key: &DependencyKey) -> Vec<&DependencyKey> {
        let Some(&target) = self.index.get(key) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|n| n.dependencies.contains(&target))
            .map(|n| &n.key)
            .collect()
    }

    /// Singletons that hold on to a per-request or uncached factory value,
    /// as `(singleton, dependency)` pairs. The singleton keeps the first value
    /// it saw for the rest of the process.
    pub fn captive_dependencies(&self) -> Vec<(&DependencyKey, &DependencyKey)> {
        self.captive
            .iter()
            .map(|&(from, to)| (&self.nodes[from].key, &self.nodes[to].key))
            .collect()
    }

    /// Keys that depend, directly or transitively, on any of `targets`. The
    /// targets themselves are included when present in the graph.
    pub fn dependents_closure<'k, I>(&self, targets: I) -> Vec<&DependencyKey>
    where
        I: IntoIterator<Item = &'k DependencyKey>,
    {
        let mut reached = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = targets
            .into_iter()
            .filter_map(|key| self.index.get(key).copied())
            .collect();
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut reached[id], true) {
                continue;
            }
            stack.extend(
                self.nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, n)| n.dependencies.contains(&id))
                    .map(|(dependent, _)| dependent),
            );
        }
        self.nodes
            .iter()
            .zip(reached)
            .filter_map(|(node, hit)| hit.then_some(&node.key))
            .collect()
    }

    /// Topological layers of registered keys, leaves first.
    ///
    /// Every key's dependencies sit in earlier layers, so the keys of one
    /// layer can be resolved concurrently. Keys inside a layer are sorted.
    /// Keys nothing provides are left out.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_depends::{DependencyContainer, DependencyKey, ParamList, Provider};
    ///
    /// let mut container = DependencyContainer::new();
    /// container.register("config".into(), Provider::value(1u8)).unwrap();
    /// container
    ///     .register(
    ///         "db".into(),
    ///         Provider::factory(ParamList::new().param("config"), |_| Ok::<_, std::io::Error>(2u8)),
    ///     )
    ///     .unwrap();
    /// container
    ///     .register(
    ///         "cache".into(),
    ///         Provider::factory(ParamList::new().param("config"), |_| Ok::<_, std::io::Error>(3u8)),
    ///     )
    ///     .unwrap();
    ///
    /// let batches = container.graph(None).unwrap().resolution_batches();
    /// let batches: Vec<Vec<String>> = batches
    ///     .iter()
    ///     .map(|b| b.iter().map(ToString::to_string).collect())
    ///     .collect();
    /// assert_eq!(batches, vec![vec!["config"], vec!["cache", "db"]]);
    /// ```
    pub fn resolution_batches(&self) -> Vec<Vec<DependencyKey>> {
        let mut placed = vec![false; self.nodes.len()];
        for (id, node) in self.nodes.iter().enumerate() {
            if !node.is_registered() {
                placed[id] = true;
            }
        }

        let mut batches = Vec::new();
        loop {
            let ready: Vec<usize> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(id, node)| !placed[*id] && node.dependencies.iter().all(|&d| placed[d]))
                .map(|(id, _)| id)
                .collect();
            if ready.is_empty() {
                break;
            }
            let mut batch: Vec<DependencyKey> = ready.iter().map(|&id| self.nodes[id].key.clone()).collect();
            batch.sort();
            for id in ready {
                placed[id] = true;
            }
            batches.push(batch);
        }
        batches
    }

    /// Graphviz rendering.
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph DependencyGraph {\n");
        output.push_str("  rankdir=TB;\n");
        output.push_str("  node [shape=box];\n\n");

        for node in &self.nodes {
            let (label, attrs) = match node.cache_mode {
                Some(CacheMode::Singleton) => ("singleton", "style=filled, fillcolor=lightblue"),
                Some(CacheMode::PerRequest) => ("per_request", "style=filled, fillcolor=lightgreen"),
                Some(CacheMode::None) => ("none", "style=filled, fillcolor=lightyellow"),
                None => ("missing", "style=dashed"),
            };
            let _ = writeln!(
                output,
                "  \"{}\" [label=\"{}\\n({})\", {}];",
                node.key, node.key, label, attrs
            );
        }

        output.push('\n');

        for node in &self.nodes {
            for &dep in &node.dependencies {
                let _ = writeln!(output, "  \"{}\" -> \"{}\";", node.key, self.nodes[dep].key);
            }
        }

        output.push_str("}\n");
        output
    }

    /// Serializable view of the graph.
    #[cfg(feature = "graph-export")]
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeSnapshot {
                    key: n.key.to_string(),
                    cache_mode: n.cache_mode,
                    dependencies: n.dependencies.iter().map(|&d| self.nodes[d].key.to_string()).collect(),
                })
                .collect(),
            batches: self
                .resolution_batches()
                .iter()
                .map(|b| b.iter().map(ToString::to_string).collect())
                .collect(),
        }
    }

    /// JSON rendering of [`DependencyGraph::snapshot`].
    #[cfg(feature = "graph-export")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}

/// Serializable graph, for tooling and UIs.
#[cfg(feature = "graph-export")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub batches: Vec<Vec<String>>,
}

#[cfg(feature = "graph-export")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub key: String,
    /// `None` for a key nothing provides
    pub cache_mode: Option<CacheMode>,
    pub dependencies: Vec<String>,
}

/// Builds the [`DependencyGraph`] of a provider set and rejects cycles.
pub struct GraphBuilder<'a> {
    registry: &'a ProviderRegistry,
    binder: &'a ParameterBinder,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a ProviderRegistry, binder: &'a ParameterBinder) -> Self {
        Self { registry, binder }
    }

    /// Graph of the providers visible from `route` (`None` for app scope).
    ///
    /// Traversal starts from every key in registration order, so the reported
    /// cycle is deterministic: for `A -> B -> A` it is `[A, B, A]`.
    pub fn build(&self, route: Option<&RouteId>) -> DiResult<DependencyGraph> {
        let mut graph = DependencyGraph::default();
        let roots = self.registry.effective_keys(route);

        for key in &roots {
            graph.intern(key);
        }
        for key in &roots {
            let Some(provider) = self.registry.get(key, route) else {
                continue;
            };
            let deps = provider.dependency_keys(self.binder, |k| self.registry.contains(k, route));
            let id = graph.intern(key);
            let dep_ids: Vec<usize> = deps.iter().map(|d| graph.intern(d)).collect();
            let node = &mut graph.nodes[id];
            node.cache_mode = Some(provider.cache_mode());
            node.dependencies = dep_ids;
        }

        if let Some(cycle) = find_cycle(&graph) {
            return Err(ResolutionError::CircularDependency { cycle });
        }
        self.check_captives(&mut graph, route)?;
        Ok(graph)
    }

    /// Rejects singletons depending on a non-singleton generator, whose
    /// resource is closed while the singleton still holds it. Singletons
    /// depending on other non-singleton providers are recorded only.
    fn check_captives(&self, graph: &mut DependencyGraph, route: Option<&RouteId>) -> DiResult<()> {
        for (id, node) in graph.nodes.iter().enumerate() {
            if node.cache_mode != Some(CacheMode::Singleton) {
                continue;
            }
            for &dep in &node.dependencies {
                let dep_node = &graph.nodes[dep];
                if matches!(dep_node.cache_mode, None | Some(CacheMode::Singleton)) {
                    continue;
                }
                let is_generator = self
                    .registry
                    .get(&dep_node.key, route)
                    .is_some_and(Provider::is_generator);
                if is_generator {
                    return Err(ResolutionError::CaptiveDependency {
                        key: node.key.clone(),
                        dependency: dep_node.key.clone(),
                    });
                }
                graph.captive.push((id, dep));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

fn find_cycle(graph: &DependencyGraph) -> Option<Vec<DependencyKey>> {
    let mut marks = vec![Mark::Unvisited; graph.nodes.len()];
    let mut path = Vec::new();
    (0..graph.nodes.len()).find_map(|root| visit(graph, root, &mut marks, &mut path))
}

fn visit(
    graph: &DependencyGraph,
    current: usize,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<DependencyKey>> {
    match marks[current] {
        Mark::Done => return None,
        Mark::OnPath => {
            let start = path.iter().position(|&id| id == current)?;
            return Some(
                path[start..]
                    .iter()
                    .chain(std::iter::once(&current))
                    .map(|&id| graph.nodes[id].key.clone())
                    .collect(),
            );
        }
        Mark::Unvisited => {}
    }

    marks[current] = Mark::OnPath;
    path.push(current);
    for &dep in &graph.nodes[current].dependencies {
        if let Some(cycle) = visit(graph, dep, marks, path) {
            return Some(cycle);
        }
    }
    path.pop();
    marks[current] = Mark::Done;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::ParamList;

    fn dep_on(names: &[&str]) -> Provider {
        Provider::factory(ParamList::new(), |_| Ok::<_, std::io::Error>(())).depends_on(names.iter().copied())
    }

    #[test]
    fn two_node_cycle_reports_full_path() {
        let mut registry = ProviderRegistry::new();
        registry.register("A".into(), dep_on(&["B"])).unwrap();
        registry.register("B".into(), dep_on(&["A"])).unwrap();

        let err = GraphBuilder::new(&registry, &ParameterBinder::default())
            .build(None)
            .unwrap_err();
        assert_eq!(
            err.cycle().unwrap(),
            &["A".into(), "B".into(), "A".into()] as &[DependencyKey]
        );
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut registry = ProviderRegistry::new();
        registry.register("A".into(), dep_on(&["A"])).unwrap();
        let err = GraphBuilder::new(&registry, &ParameterBinder::default())
            .build(None)
            .unwrap_err();
        assert_eq!(err.cycle().unwrap().len(), 2);
    }

    #[test]
    fn unregistered_keys_are_leaves() {
        let mut registry = ProviderRegistry::new();
        registry.register("a".into(), dep_on(&["ghost"])).unwrap();
        let graph = GraphBuilder::new(&registry, &ParameterBinder::default())
            .build(None)
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert!(!graph.node(&"ghost".into()).unwrap().is_registered());
        assert_eq!(graph.dependents_of(&"ghost".into()), vec![&DependencyKey::named("a")]);
        assert_eq!(graph.resolution_batches(), vec![vec![DependencyKey::named("a")]]);
    }

    #[test]
    fn diamond_batches() {
        let mut registry = ProviderRegistry::new();
        registry.register("app".into(), dep_on(&["db", "cache"])).unwrap();
        registry.register("db".into(), dep_on(&["config"])).unwrap();
        registry.register("cache".into(), dep_on(&["config"])).unwrap();
        registry.register("config".into(), Provider::value(0u8)).unwrap();

        let graph = GraphBuilder::new(&registry, &ParameterBinder::default())
            .build(None)
            .unwrap();
        assert_eq!(
            graph.resolution_batches(),
            vec![
                vec![DependencyKey::named("config")],
                vec![DependencyKey::named("cache"), DependencyKey::named("db")],
                vec![DependencyKey::named("app")],
            ]
        );
        assert!(graph.to_dot().contains("\"app\" -> \"db\";"));
    }

    #[test]
    fn route_override_can_introduce_cycle() {
        let mut registry = ProviderRegistry::new();
        registry.register("a".into(), dep_on(&["b"])).unwrap();
        registry.register("b".into(), Provider::value(1u8)).unwrap();
        let route = RouteId::new("/loop");
        registry
            .override_for_route(route.clone(), "b".into(), dep_on(&["a"]))
            .unwrap();

        let binder = ParameterBinder::default();
        let builder = GraphBuilder::new(&registry, &binder);
        assert!(builder.build(None).is_ok());
        assert!(builder.build(Some(&route)).is_err());
    }

    #[test]
    fn singleton_on_request_generator_is_rejected() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(
                "session".into(),
                Provider::generator(
                    ParamList::new(),
                    |_| Ok::<_, std::io::Error>(1u8),
                    |_: std::sync::Arc<u8>| Ok::<_, std::io::Error>(()),
                ),
            )
            .unwrap();
        registry.register("audit".into(), dep_on(&["session"]).singleton()).unwrap();

        let err = GraphBuilder::new(&registry, &ParameterBinder::default())
            .build(None)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CaptiveDependency);
        assert_eq!(
            err.to_string(),
            "Singleton audit depends on request-scoped resource session"
        );
    }

    #[test]
    fn singleton_on_request_factory_is_recorded() {
        let mut registry = ProviderRegistry::new();
        registry.register("clock".into(), dep_on(&[])).unwrap();
        registry.register("config".into(), Provider::value(0u8)).unwrap();
        registry
            .register("cache".into(), dep_on(&["clock", "config"]).singleton())
            .unwrap();

        let graph = GraphBuilder::new(&registry, &ParameterBinder::default())
            .build(None)
            .unwrap();
        assert_eq!(
            graph.captive_dependencies(),
            vec![(&DependencyKey::named("cache"), &DependencyKey::named("clock"))]
        );
    }

    #[test]
    fn dependents_closure_follows_reverse_edges() {
        let mut registry = ProviderRegistry::new();
        registry.register("app".into(), dep_on(&["db"])).unwrap();
        registry.register("db".into(), dep_on(&["config"])).unwrap();
        registry.register("cache".into(), dep_on(&[])).unwrap();
        registry.register("config".into(), Provider::value(0u8)).unwrap();

        let graph = GraphBuilder::new(&registry, &ParameterBinder::default())
            .build(None)
            .unwrap();
        let config = DependencyKey::named("config");
        let reached: Vec<String> = graph
            .dependents_closure([&config])
            .into_iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(reached, vec!["app", "db", "config"]);
    }
}
