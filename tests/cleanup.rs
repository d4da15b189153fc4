use ferrous_depends::{
    DependencyContainer, DependencyKey, ErrorKind, ParamList, Provider, RequestError, ResolutionError,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

struct Resource(&'static str);

/// Generator that logs `<name>_opened` and `<name>_closed`.
fn tracked(name: &'static str, deps: &[&'static str], log: &Log) -> Provider {
    let params: ParamList = deps.iter().fold(ParamList::new(), |p, d| p.param(*d));
    let open_log = log.clone();
    let close_log = log.clone();
    Provider::generator(
        params,
        move |_| {
            open_log.lock().unwrap().push(format!("{name}_opened"));
            Ok::<_, ResolutionError>(Resource(name))
        },
        move |res: Arc<Resource>| {
            close_log.lock().unwrap().push(format!("{}_closed", res.0));
            Ok::<_, ResolutionError>(())
        },
    )
}

fn closes(log: &Log) -> Vec<String> {
    entries(log)
        .into_iter()
        .filter(|e| e.ends_with("_closed"))
        .collect()
}

/// db <- cache <- session
fn layered_container(log: &Log) -> DependencyContainer {
    let mut container = DependencyContainer::new();
    container.register("db".into(), tracked("db", &[], log)).unwrap();
    container.register("cache".into(), tracked("cache", &["db"], log)).unwrap();
    container
        .register("session".into(), tracked("session", &["cache"], log))
        .unwrap();
    container
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn teardown_runs_in_reverse_creation_order() {
    let log = Log::default();
    let container = layered_container(&log);

    let outcome = container
        .run_request(
            &ParamList::new().param("session"),
            None,
            |_| {},
            |args| async move {
                assert!(args.contains("session"));
                Ok::<_, ResolutionError>(())
            },
        )
        .await;

    assert!(outcome.is_ok());
    assert!(outcome.cleanup_failures.is_empty());
    assert_eq!(
        entries(&log),
        vec![
            "db_opened",
            "cache_opened",
            "session_opened",
            "session_closed",
            "cache_closed",
            "db_closed",
        ]
    );
}

#[tokio::test]
async fn teardown_runs_when_the_handler_fails() {
    let log = Log::default();
    let container = layered_container(&log);

    let outcome = container
        .run_request(
            &ParamList::new().param("session"),
            None,
            |_| {},
            |_| async { Err::<(), _>("handler exploded") },
        )
        .await;

    match outcome.result {
        Err(RequestError::Handler(msg)) => assert_eq!(msg, "handler exploded"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(closes(&log), vec!["session_closed", "cache_closed", "db_closed"]);
}

#[tokio::test]
async fn teardown_runs_when_resolution_fails_midway() {
    let log = Log::default();
    let mut container = layered_container(&log);
    container
        .register(
            "broken".into(),
            Provider::factory(ParamList::new().param("cache"), |_| {
                Err::<(), _>("broken provider")
            }),
        )
        .unwrap();

    let outcome = container
        .run_request(
            &ParamList::new().param("broken").param("session"),
            None,
            |_| {},
            |_| async { Ok::<_, ResolutionError>(()) },
        )
        .await;

    let err = outcome.result.unwrap_err();
    assert_eq!(err.resolution().map(ResolutionError::kind), Some(ErrorKind::ProviderFailed));
    // `session` was never opened
    assert_eq!(
        entries(&log),
        vec!["db_opened", "cache_opened", "cache_closed", "db_closed"]
    );
}

#[tokio::test]
async fn failing_teardown_is_collected_and_the_drain_continues() {
    let log = Log::default();
    let mut container = layered_container(&log);
    container
        .register(
            "leaky".into(),
            Provider::generator(
                ParamList::new().param("db"),
                |_| Ok::<_, ResolutionError>(Resource("leaky")),
                |_: Arc<Resource>| Err::<(), _>("socket already closed"),
            ),
        )
        .unwrap();

    let outcome = container
        .run_request(
            &ParamList::new().param("leaky").param("session"),
            None,
            |_| {},
            |_| async { Ok::<_, ResolutionError>(()) },
        )
        .await;

    assert!(outcome.is_ok());
    assert_eq!(outcome.cleanup_failures.len(), 1);
    assert_eq!(outcome.cleanup_failures[0].key, DependencyKey::named("leaky"));
    assert_eq!(
        outcome.cleanup_failures[0].to_string(),
        "Cleanup of leaky failed: socket already closed"
    );
    // db, leaky, cache, session were opened in that order
    assert_eq!(closes(&log), vec!["session_closed", "cache_closed", "db_closed"]);
}

#[tokio::test]
async fn cancelled_request_still_cleans_up() {
    let log = Log::default();
    let container = layered_container(&log);

    let params = ParamList::new().param("session");
    let request = container.run_request(
        &params,
        None,
        |_| {},
        |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ResolutionError>(())
        },
    );
    let timed_out = tokio::time::timeout(Duration::from_millis(20), request).await;
    assert!(timed_out.is_err());

    // Teardown was handed to the runtime when the request future was dropped
    for _ in 0..50 {
        if closes(&log).len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(closes(&log), vec!["session_closed", "cache_closed", "db_closed"]);
}

#[tokio::test]
async fn async_generators_close_asynchronously() {
    let log = Log::default();
    let close_log = log.clone();
    let mut container = DependencyContainer::new();
    container
        .register(
            "conn".into(),
            Provider::async_generator(
                ParamList::new(),
                |_| async { Ok::<_, ResolutionError>(Resource("conn")) },
                move |res: Arc<Resource>| {
                    let log = close_log.clone();
                    async move {
                        tokio::task::yield_now().await;
                        log.lock().unwrap().push(res.0.to_string());
                        Ok::<_, ResolutionError>(())
                    }
                },
            ),
        )
        .unwrap();

    let mut scope = container.begin_request_scope();
    container.resolve(&["conn".into()], None, &mut scope).await.unwrap();
    assert!(entries(&log).is_empty());

    let failures = container.end_request_scope(scope).await;
    assert!(failures.is_empty());
    assert_eq!(entries(&log), vec!["conn"]);
}

#[tokio::test]
async fn singleton_generators_close_at_shutdown() {
    let log = Log::default();
    let mut container = DependencyContainer::new();
    container
        .register("pool".into(), tracked("pool", &[], &log).singleton())
        .unwrap();
    container
        .register("conn".into(), tracked("conn", &["pool"], &log))
        .unwrap();

    for _ in 0..2 {
        let mut scope = container.begin_request_scope();
        container.resolve(&["conn".into()], None, &mut scope).await.unwrap();
        container.end_request_scope(scope).await;
    }
    assert_eq!(closes(&log), vec!["conn_closed", "conn_closed"]);

    let failures = container.shutdown().await;
    assert!(failures.is_empty());
    assert_eq!(closes(&log), vec!["conn_closed", "conn_closed", "pool_closed"]);
    assert_eq!(entries(&log).iter().filter(|e| *e == "pool_opened").count(), 1);
    assert_eq!(container.singleton_count(), 0);
}

#[tokio::test]
async fn cancellation_during_an_async_close_still_finishes_teardown() {
    let log = Log::default();
    let mut container = DependencyContainer::new();
    container.register("db".into(), tracked("db", &[], &log)).unwrap();
    let close_log = log.clone();
    container
        .register(
            "session".into(),
            Provider::async_generator(
                ParamList::new().param("db"),
                |_| async { Ok::<_, ResolutionError>(Resource("session")) },
                move |res: Arc<Resource>| {
                    let log = close_log.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        log.lock().unwrap().push(format!("{}_closed", res.0));
                        Ok::<_, ResolutionError>(())
                    }
                },
            ),
        )
        .unwrap();

    // The handler returns at once; the timeout fires inside session's close
    let params = ParamList::new().param("session");
    let request = container.run_request(
        &params,
        None,
        |_| {},
        |_| async { Ok::<_, ResolutionError>(()) },
    );
    let timed_out = tokio::time::timeout(Duration::from_millis(20), request).await;
    assert!(timed_out.is_err());
    assert!(closes(&log).is_empty());

    for _ in 0..60 {
        if closes(&log).len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(closes(&log), vec!["session_closed", "db_closed"]);
}
