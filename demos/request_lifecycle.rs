//! Request Lifecycle Demo - one container serving several simulated requests
//!
//! This example demonstrates:
//! - A singleton connection pool shared by every request
//! - Per-request sessions opened and closed by generator providers
//! - A route override swapping the mailer for a test double
//! - Cycle rejection at registration time
//! - Teardown on handler failure and at container shutdown
//!
//! Run with `RUST_LOG=ferrous_depends=debug` to see resolution events.

use ferrous_depends::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Pool {
    dsn: String,
}

struct Session {
    id: u32,
    pool: Arc<Pool>,
}

trait Mailer: Send + Sync {
    fn send(&self, to: &str) -> String;
}

struct SmtpMailer;

impl Mailer for SmtpMailer {
    fn send(&self, to: &str) -> String {
        format!("smtp -> {to}")
    }
}

struct CapturingMailer;

impl Mailer for CapturingMailer {
    fn send(&self, to: &str) -> String {
        format!("captured ({to})")
    }
}

type DynMailer = Arc<dyn Mailer>;

fn build_container() -> DiResult<DependencyContainer> {
    let mut container = DependencyContainer::with_config(ContainerConfig::default().max_depth(16));
    container.add_observer(Arc::new(TracingObserver::with_label("demo")));

    container.register("dsn".into(), Provider::value(String::from("postgres://localhost/app")))?;

    container.register(
        "pool".into(),
        Provider::generator(
            ParamList::new().typed::<String>("dsn"),
            |args| {
                let dsn = args.get::<String>("dsn")?;
                println!("🔌 opening pool for {dsn}");
                Ok::<_, ResolutionError>(Pool { dsn: dsn.to_string() })
            },
            |pool: Arc<Pool>| {
                println!("🔌 closing pool for {}", pool.dsn);
                Ok::<_, ResolutionError>(())
            },
        )
        .singleton(),
    )?;

    let next_session = Arc::new(AtomicU32::new(1));
    container.register(
        "session".into(),
        Provider::async_generator(
            ParamList::new().typed::<Pool>("pool"),
            move |args| {
                let id = next_session.fetch_add(1, Ordering::SeqCst);
                async move {
                    let pool = args.get::<Pool>("pool")?;
                    println!("  📂 session {id} opened");
                    Ok::<_, ResolutionError>(Session { id, pool })
                }
            },
            |session: Arc<Session>| async move {
                println!("  📁 session {} closed", session.id);
                Ok::<_, ResolutionError>(())
            },
        ),
    )?;

    container.register(
        "mailer".into(),
        Provider::value::<DynMailer>(Arc::new(SmtpMailer)),
    )?;

    container.override_for_route(
        RouteId::new("/test/signup"),
        "mailer".into(),
        Provider::value::<DynMailer>(Arc::new(CapturingMailer)),
    )?;

    Ok(container)
}

fn signup_params() -> ParamList {
    ParamList::new()
        .param("request")
        .typed::<Session>("session")
        .typed::<DynMailer>("mailer")
}

async fn signup(container: &DependencyContainer, route: &RouteId, email: &'static str) {
    let outcome = container
        .run_request(
            &signup_params(),
            Some(route),
            |scope| scope.provide_special("request", email),
            |args| async move {
                let session = args.get::<Session>("session")?;
                let mailer = args.get::<DynMailer>("mailer")?;
                let to = args.get::<&str>("request")?;
                if to.is_empty() {
                    return Err(ResolutionError::MissingDependency { key: "email".into() });
                }
                Ok(format!(
                    "session {} on {} sent {}",
                    session.id,
                    session.pool.dsn,
                    mailer.send(*to)
                ))
            },
        )
        .await;

    match outcome.into_result() {
        Ok(summary) => println!("  ✅ {route}: {summary}"),
        Err(err) => println!("  ❌ {route}: {err}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🚀 Request lifecycle demo\n");
    let container = build_container()?;

    println!("📊 Resolution batches:");
    for (layer, batch) in container.graph(None)?.resolution_batches().iter().enumerate() {
        let keys: Vec<String> = batch.iter().map(ToString::to_string).collect();
        println!("  {layer}: {}", keys.join(", "));
    }

    println!("\n📨 Requests:");
    let live = RouteId::new("/signup");
    let test = RouteId::new("/test/signup");
    signup(&container, &live, "ada@example.com").await;
    signup(&container, &test, "grace@example.com").await;
    signup(&container, &live, "").await;

    println!("\n🔁 Cycle rejection:");
    let mut cyclic = DependencyContainer::new();
    cyclic.register(
        "a".into(),
        Provider::factory(ParamList::new().param("b"), |_| Ok::<_, ResolutionError>(())),
    )?;
    let err = cyclic
        .register(
            "b".into(),
            Provider::factory(ParamList::new().param("a"), |_| Ok::<_, ResolutionError>(())),
        )
        .unwrap_err();
    println!("  {err}");

    println!("\n🛑 Shutdown:");
    let failures = container.shutdown().await;
    println!("  {} cleanup failure(s)", failures.len());

    Ok(())
}
