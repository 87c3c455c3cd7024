//! End-to-end tests: a real listener driven through reqwest.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use trellis::config::{AppConfig, StaticMount};
use trellis::http::middleware::{recover, request_id, X_REQUEST_ID};
use trellis::{handler, App, Context, Module, Route};

mod common;

#[derive(Clone)]
struct Deps {
    greeting: String,
}

fn users_module(events: Arc<Mutex<Vec<&'static str>>>) -> Module<Deps> {
    let on_use = events.clone();
    let on_start = events;
    Module::new("users", "/users", Deps { greeting: "hi".into() })
        .on_use(move |deps, _| {
            on_use.lock().unwrap().push("use");
            deps.greeting = "hello".into();
            Ok(())
        })
        .on_start(move |_, _| {
            on_start.lock().unwrap().push("start");
            Ok(())
        })
        .route(Route::get("/{id}", |ctx: Context, deps: Deps| async move {
            let id = ctx.param("id").unwrap_or_default().to_string();
            ctx.writer().text(StatusCode::OK, format!("{} {}", deps.greeting, id));
        }))
        .route(Route::post("/{id}", |ctx: Context, _: Deps| async move {
            let body = String::from_utf8_lossy(ctx.body()).into_owned();
            ctx.writer().text(StatusCode::CREATED, body);
        }))
}

#[tokio::test]
async fn test_module_routes_and_hooks() {
    let addr: SocketAddr = "127.0.0.1:28301".parse().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));

    let mut app = App::new();
    app.use_module(users_module(events.clone())).unwrap();
    assert_eq!(*events.lock().unwrap(), vec!["use"]);

    let shutdown = common::start_app(app, addr).await;
    assert_eq!(*events.lock().unwrap(), vec!["use", "start"]);

    let client = common::client();
    let res = client
        .get(format!("http://{addr}/users/42"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "hello 42");

    let res = client
        .post(format!("http://{addr}/users/7"))
        .body("ferris")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    assert_eq!(res.text().await.unwrap(), "ferris");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unmatched_requests() {
    let addr: SocketAddr = "127.0.0.1:28302".parse().unwrap();
    let mut app = App::new();
    app.router_mut()
        .handle(
            "GET /ping",
            handler(|ctx: Context| async move {
                ctx.writer().text(StatusCode::OK, "pong");
            }),
            &[],
        )
        .unwrap();

    let shutdown = common::start_app(app, addr).await;
    let client = common::client();

    let res = client.get(format!("http://{addr}/missing")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client.delete(format!("http://{addr}/ping")).send().await.unwrap();
    assert_eq!(res.status(), 405);
    let allow = res.headers().get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("GET"));

    // `handle` registers the trailing-slash variant too.
    for path in ["/ping", "/ping/"] {
        let res = client.get(format!("http://{addr}{path}")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.text().await.unwrap(), "pong");
    }

    shutdown.trigger();
}

#[tokio::test]
async fn test_global_middleware_over_real_listener() {
    let addr: SocketAddr = "127.0.0.1:28303".parse().unwrap();
    let mut app = App::new();
    app.use_middleware([request_id(), recover()]);
    app.router_mut()
        .handle(
            "GET /panic",
            handler(|_ctx: Context| async move {
                panic!("handler exploded");
            }),
            &[],
        )
        .unwrap();

    let shutdown = common::start_app(app, addr).await;
    let client = common::client();

    let res = client
        .get(format!("http://{addr}/panic"))
        .header(X_REQUEST_ID.as_str(), "req-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(res.headers().get(X_REQUEST_ID.as_str()).unwrap(), "req-123");

    shutdown.trigger();
}

#[tokio::test]
async fn test_static_mount_from_config() {
    let addr: SocketAddr = "127.0.0.1:28304".parse().unwrap();
    let dir = common::temp_dir();
    std::fs::write(dir.join("index.txt"), "static body").unwrap();

    let mut config = AppConfig::default();
    config.static_mounts.push(StaticMount {
        prefix: "/assets".into(),
        dir: dir.to_string_lossy().into_owned(),
    });

    let app = App::from_config(&config).unwrap();
    let shutdown = common::start_app(app, addr).await;
    let client = common::client();

    let res = client
        .get(format!("http://{addr}/assets/index.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "static body");

    let res = client
        .get(format!("http://{addr}/assets/nope.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    shutdown.trigger();
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_listener() {
    let addr: SocketAddr = "127.0.0.1:28305".parse().unwrap();
    let shutdown = common::start_app(App::new(), addr).await;
    assert!(tokio::net::TcpStream::connect(addr).await.is_ok());

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
