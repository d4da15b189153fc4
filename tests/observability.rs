use ferrous_depends::{
    CleanupFailure, DependencyContainer, DependencyKey, ParamList, Provider, ResolutionError,
    ResolutionObserver, TracingObserver,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ResolutionObserver for Recorder {
    fn resolving(&self, key: &DependencyKey) {
        self.events.lock().unwrap().push(format!("resolving {key}"));
    }

    fn resolved(&self, key: &DependencyKey, _duration: Duration) {
        self.events.lock().unwrap().push(format!("resolved {key}"));
    }

    fn failed(&self, key: &DependencyKey, error: &ResolutionError) {
        self.events
            .lock()
            .unwrap()
            .push(format!("failed {key}: {:?}", error.kind()));
    }

    fn cleanup_failed(&self, failure: &CleanupFailure) {
        self.events
            .lock()
            .unwrap()
            .push(format!("cleanup failed {}", failure.key));
    }
}

#[tokio::test]
async fn observer_sees_provider_invocations_only() {
    let recorder = Arc::new(Recorder::default());
    let mut container = DependencyContainer::new();
    container.add_observer(recorder.clone());
    container.add_observer(Arc::new(TracingObserver::new()));

    container.register("config".into(), Provider::value(1u8)).unwrap();
    container
        .register(
            "db".into(),
            Provider::factory(ParamList::new().param("config"), |_| Ok::<_, ResolutionError>("db")),
        )
        .unwrap();

    let mut scope = container.begin_request_scope();
    container.resolve(&["db".into()], None, &mut scope).await.unwrap();
    // cache hit: silent
    container.resolve(&["db".into()], None, &mut scope).await.unwrap();
    container.end_request_scope(scope).await;

    assert_eq!(recorder.events(), vec!["resolving db", "resolved db"]);
}

#[tokio::test]
async fn observer_sees_failures_along_the_path() {
    let recorder = Arc::new(Recorder::default());
    let mut container = DependencyContainer::new();
    container.add_observer(recorder.clone());
    container
        .register(
            "service".into(),
            Provider::factory(ParamList::new().param("missing"), |_| Ok::<_, ResolutionError>(())),
        )
        .unwrap();

    let mut scope = container.begin_request_scope();
    assert!(container.resolve(&["service".into()], None, &mut scope).await.is_err());

    assert_eq!(
        recorder.events(),
        vec!["failed missing: MissingDependency", "failed service: MissingDependency"]
    );
}

#[tokio::test]
async fn observer_sees_cleanup_failures() {
    let recorder = Arc::new(Recorder::default());
    let mut container = DependencyContainer::new();
    container.add_observer(recorder.clone());
    container
        .register(
            "file".into(),
            Provider::generator(
                ParamList::new(),
                |_| Ok::<_, ResolutionError>(3u8),
                |_: Arc<u8>| Err::<(), _>("already closed"),
            ),
        )
        .unwrap();

    let mut scope = container.begin_request_scope();
    container.resolve(&["file".into()], None, &mut scope).await.unwrap();
    let failures = container.end_request_scope(scope).await;

    assert_eq!(failures.len(), 1);
    assert_eq!(
        recorder.events().last().map(String::as_str),
        Some("cleanup failed file")
    );
}

#[test]
fn dot_export_lists_nodes_and_edges() {
    let mut container = DependencyContainer::new();
    container.register("config".into(), Provider::value(1u8)).unwrap();
    container
        .register(
            "db".into(),
            Provider::factory(ParamList::new().param("config").param("secrets"), |_| {
                Ok::<_, ResolutionError>(())
            })
            .singleton(),
        )
        .unwrap();

    let dot = container.graph(None).unwrap().to_dot();
    assert!(dot.starts_with("digraph DependencyGraph {"));
    assert!(dot.contains("\"db\" [label=\"db\\n(singleton)\""));
    assert!(dot.contains("\"secrets\" [label=\"secrets\\n(missing)\", style=dashed]"));
    assert!(dot.contains("\"db\" -> \"config\";"));
}

#[cfg(feature = "graph-export")]
#[test]
fn json_snapshot_round_trips() {
    use ferrous_depends::{CacheMode, GraphSnapshot};

    let mut container = DependencyContainer::new();
    container.register("config".into(), Provider::value(1u8)).unwrap();
    container
        .register(
            "db".into(),
            Provider::factory(ParamList::new().param("config"), |_| Ok::<_, ResolutionError>(())),
        )
        .unwrap();

    let graph = container.graph(None).unwrap();
    let json = graph.to_json().unwrap();
    let parsed: GraphSnapshot = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed, graph.snapshot());
    assert_eq!(parsed.batches, vec![vec!["config".to_string()], vec!["db".to_string()]]);
    let db = parsed.nodes.iter().find(|n| n.key == "db").unwrap();
    assert_eq!(db.cache_mode, Some(CacheMode::PerRequest));
    assert_eq!(db.dependencies, vec!["config".to_string()]);
}
