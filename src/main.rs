//! Trellis demo server.
//!
//! Serves a small `greeter` module behind the built-in request-id,
//! logger and recover middleware.
//!
//! ```text
//! trellis --addr :8080
//! curl localhost:8080/greeter/hello/ferris
//! ```

use std::path::PathBuf;

use axum::http::StatusCode;
use clap::Parser;

use trellis::config::{load_config, AppConfig};
use trellis::http::middleware::{logger, recover, request_id};
use trellis::observability::logging;
use trellis::{App, Context, Module, Route};

#[derive(Debug, Parser)]
#[command(name = "trellis", version, about = "Modular HTTP application server")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration (e.g. ":8080").
    #[arg(short, long)]
    addr: Option<String>,
}

#[derive(Clone)]
struct Greeter {
    greeting: String,
    served_by: String,
}

fn greeter_module() -> Module<Greeter> {
    Module::new(
        "greeter",
        "/greeter",
        Greeter {
            greeting: "Hello".to_string(),
            served_by: String::new(),
        },
    )
    .on_use(|deps, services| {
        if let Some(name) = services.get::<String>("instance") {
            deps.served_by = name;
        }
        Ok(())
    })
    .on_start(|deps, _| {
        tracing::info!(greeting = %deps.greeting, "Greeter ready");
        Ok(())
    })
    .route(Route::get("/hello", |ctx: Context, deps: Greeter| async move {
        ctx.writer()
            .text(StatusCode::OK, format!("{}, world!", deps.greeting));
    }))
    .route(Route::get("/hello/{name}", |ctx: Context, deps: Greeter| async move {
        let name = ctx.param("name").unwrap_or("stranger");
        let body = serde_json::json!({
            "message": format!("{}, {}!", deps.greeting, name),
            "served_by": deps.served_by,
        });
        if let Err(e) = ctx.writer().json(StatusCode::OK, &body) {
            tracing::error!(error = %e, "Failed to encode greeting");
        }
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    logging::init(&config.logging);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "trellis starting");

    let mut app = App::from_config(&config)?;
    if let Some(addr) = &cli.addr {
        app = app.with_address(addr);
    }

    app.use_middleware([request_id(), logger(), recover()]);
    app.register_service("instance", format!("trellis-{}", uuid::Uuid::new_v4()));
    app.use_module(greeter_module())?;

    tracing::info!(
        address = %app.bind_address(),
        modules = ?app.module_names(),
        "Configuration loaded"
    );

    app.run().await?;
    Ok(())
}
