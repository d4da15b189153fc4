use ferrous_depends::{
    DependencyContainer, DependencyKey, ErrorKind, Param, ParamList, Provider, ResolutionError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Settings {
    dsn: String,
}

#[derive(Debug)]
struct Database {
    dsn: String,
}

struct UserRepository {
    db: Arc<Database>,
}

fn container_with_settings() -> DependencyContainer {
    let mut container = DependencyContainer::new();
    container
        .register(
            "settings".into(),
            Provider::value(Settings {
                dsn: "postgres://localhost/app".into(),
            }),
        )
        .unwrap();
    container
}

#[tokio::test]
async fn value_and_factory_chain() {
    let mut container = container_with_settings();
    container
        .register(
            "db".into(),
            Provider::factory(ParamList::new().typed::<Settings>("settings"), |args| {
                let settings = args.get::<Settings>("settings")?;
                Ok::<_, ResolutionError>(Database {
                    dsn: settings.dsn.clone(),
                })
            }),
        )
        .unwrap();
    container
        .register(
            "users".into(),
            Provider::async_factory(ParamList::new().typed::<Database>("db"), |args| async move {
                Ok::<_, ResolutionError>(UserRepository { db: args.get("db")? })
            }),
        )
        .unwrap();

    let mut scope = container.begin_request_scope();
    let args = container
        .resolve_for_call_site(
            &ParamList::new().typed::<UserRepository>("users"),
            None,
            &mut scope,
        )
        .await
        .unwrap();

    let users = args.get::<UserRepository>("users").unwrap();
    assert_eq!(users.db.dsn, "postgres://localhost/app");
    assert!(container.end_request_scope(scope).await.is_empty());
}

#[tokio::test]
async fn missing_dependency_never_invokes_dependent_factory() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut container = DependencyContainer::new();
    container
        .register(
            "handler_dep".into(),
            Provider::factory(ParamList::new().param("x"), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ResolutionError>(())
            }),
        )
        .unwrap();

    let mut scope = container.begin_request_scope();
    let err = container
        .resolve(&["handler_dep".into()], None, &mut scope)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingDependency);
    assert_eq!(err.keys(), vec![&DependencyKey::named("x")]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn duplicate_app_registration_is_rejected() {
    let mut container = container_with_settings();
    let err = container
        .register("settings".into(), Provider::value(1u8))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateProvider);
    assert_eq!(
        err.to_string(),
        "Duplicate provider for settings at app scope"
    );
}

#[tokio::test]
async fn typed_parameter_falls_back_to_type_key() {
    let mut container = DependencyContainer::new();
    container
        .register_type::<Database>(Provider::value(Database {
            dsn: "sqlite::memory:".into(),
        }))
        .unwrap();

    // Parameter name matches nothing, its type does
    let params = ParamList::new().typed::<Database>("database");
    let mut scope = container.begin_request_scope();
    let args = container
        .resolve_for_call_site(&params, None, &mut scope)
        .await
        .unwrap();

    assert_eq!(args.get::<Database>("database").unwrap().dsn, "sqlite::memory:");
}

#[tokio::test]
async fn name_match_with_wrong_type_is_a_mismatch() {
    let mut container = DependencyContainer::new();
    container
        .register("db".into(), Provider::value(String::from("not a database")))
        .unwrap();

    let mut scope = container.begin_request_scope();
    let err = container
        .resolve_for_call_site(&ParamList::new().typed::<Database>("db"), None, &mut scope)
        .await
        .unwrap_err();

    match err {
        ResolutionError::TypeMismatch { key, actual, .. } => {
            assert_eq!(key, DependencyKey::named("db"));
            assert!(actual.contains("String"));
        }
        other => panic!("expected TypeMismatch, got {other}"),
    }
}

#[tokio::test]
async fn reserved_names_are_not_resolved() {
    let mut container = DependencyContainer::new();
    // A provider under a reserved name is never consulted
    container
        .register("request".into(), Provider::value("from provider"))
        .unwrap();

    let mut scope = container.begin_request_scope();
    scope.provide_special("request", "from dispatcher");

    let params = ParamList::new().typed::<&str>("request");
    let args = container
        .resolve_for_call_site(&params, None, &mut scope)
        .await
        .unwrap();
    assert_eq!(*args.get::<&str>("request").unwrap(), "from dispatcher");

    let resolved = container
        .resolve(&["request".into()], None, &mut scope)
        .await
        .unwrap();
    assert!(resolved.is_empty());
}

#[tokio::test]
async fn defaults_fill_unprovided_parameters() {
    let container = DependencyContainer::new();
    let params = ParamList::new()
        .with(Param::new("page_size").with_default(25u32))
        .with(Param::new("cursor").optional());

    let mut scope = container.begin_request_scope();
    let args = container
        .resolve_for_call_site(&params, None, &mut scope)
        .await
        .unwrap();

    assert_eq!(*args.get::<u32>("page_size").unwrap(), 25);
    assert!(!args.contains("cursor"));
}

#[tokio::test]
async fn explicit_depends_on_takes_precedence() {
    let mut container = DependencyContainer::new();
    container.register("primary".into(), Provider::value(1u8)).unwrap();
    container.register("replica".into(), Provider::value(2u8)).unwrap();

    // The parameter table names `primary`, but the explicit list only pulls `replica`,
    // which then binds to the typed parameter through the type fallback.
    container
        .register(
            "reader".into(),
            Provider::factory(ParamList::new().typed::<u8>("primary"), |args| {
                Ok::<_, ResolutionError>(*args.get::<u8>("primary")?)
            })
            .depends_on(["replica"]),
        )
        .unwrap();

    let graph = container.graph(None).unwrap();
    assert_eq!(
        graph.dependencies_of(&"reader".into()),
        vec![&DependencyKey::named("replica")]
    );

    let mut scope = container.begin_request_scope();
    let resolved = container
        .resolve(&["reader".into()], None, &mut scope)
        .await
        .unwrap();
    assert_eq!(*resolved.get_as::<u8>(&"reader".into()).unwrap(), 2);
}

#[tokio::test]
async fn provider_failure_carries_its_cause() {
    let mut container = DependencyContainer::new();
    container
        .register(
            "db".into(),
            Provider::factory(ParamList::new(), |_| {
                Err::<Database, _>(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))
            }),
        )
        .unwrap();

    let mut scope = container.begin_request_scope();
    let err = container
        .resolve(&["db".into()], None, &mut scope)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProviderFailed);
    assert_eq!(err.to_string(), "Provider for db failed: connection refused");
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn declared_type_is_checked() {
    use ferrous_depends::{Arguments, BoxError, Factory, ResolvedValue};

    struct WrongFactory;

    #[ferrous_depends::async_trait]
    impl Factory for WrongFactory {
        async fn create(&self, _args: Arguments) -> Result<ResolvedValue, BoxError> {
            Ok(ResolvedValue::new(42i64))
        }
    }

    let mut container = DependencyContainer::new();
    container
        .register(
            "db".into(),
            Provider::from_factory(ParamList::new(), WrongFactory).produces::<Database>(),
        )
        .unwrap();

    let mut scope = container.begin_request_scope();
    let err = container
        .resolve(&["db".into()], None, &mut scope)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}
