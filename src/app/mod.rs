//! Application host.
//!
//! # Responsibilities
//! - Own the router, the attached modules and the service registry
//! - Attach modules in order: inject services → `on_use` → build routes
//! - Run `on_start` for every module, in attachment order, then listen
//!
//! # Design Decisions
//! - Fail fast: every startup error is returned before the listener starts
//! - The "start serving" step is a replaceable [`ServeFn`], so tests can
//!   intercept startup without binding a socket
//! - The application never touches module internals beyond [`AppModule`]

pub mod server;

use std::path::Path;

use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::schema::normalize_address;
use crate::config::AppConfig;
use crate::http::chain::Middleware;
use crate::lifecycle::Shutdown;
use crate::module::{AppModule, HookError};
use crate::routing::{Router, RouterError};
use crate::services::Services;

pub use server::{serve_fn, serve_tcp, ServeFn};

/// Startup errors. All of them abort startup.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("route registration failed: {0}")]
    Router(#[from] RouterError),

    #[error("module {0:?} is already attached")]
    ModuleAlreadyAttached(String),

    #[error("{hook} hook of module {module:?} failed: {source}")]
    Hook {
        module: String,
        hook: &'static str,
        #[source]
        source: HookError,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Owns one router, the attached modules and the shared services.
pub struct App {
    router: Router,
    modules: Vec<Box<dyn AppModule>>,
    services: Services,
    bind_address: String,
    serve: ServeFn,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl App {
    /// An application listening on the default address.
    pub fn new() -> Self {
        Self::with_router(Router::new(), AppConfig::default().listener.bind_address)
    }

    /// Build an application from validated configuration, mounting its
    /// static directories.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let router = Router::new().with_body_limit(config.listener.max_body_bytes);
        let mut app = Self::with_router(router, config.listener.socket_address());
        for mount in &config.static_mounts {
            app.static_files(&mount.prefix, &mount.dir, &[])?;
        }
        Ok(app)
    }

    fn with_router(router: Router, bind_address: String) -> Self {
        Self {
            router,
            modules: Vec::new(),
            services: Services::new(),
            bind_address,
            serve: serve_tcp(),
            shutdown: None,
        }
    }

    /// Override the listen address. `":8080"` means every interface.
    pub fn with_address(mut self, address: &str) -> Self {
        self.bind_address = normalize_address(address);
        self
    }

    /// Replace the function that binds the listener and serves.
    pub fn with_server(mut self, serve: ServeFn) -> Self {
        self.serve = serve;
        self
    }

    /// Stop serving when `shutdown` is triggered (in addition to Ctrl+C).
    pub fn with_shutdown(mut self, shutdown: &Shutdown) -> Self {
        self.shutdown = Some(shutdown.subscribe());
        self
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// Attach a module.
    ///
    /// Services are injected first if the module asks for them, then its
    /// `on_use` hook runs, then its routes are registered.
    pub fn use_module<M>(&mut self, module: M) -> Result<(), AppError>
    where
        M: AppModule + 'static,
    {
        self.use_boxed_module(Box::new(module))
    }

    pub fn use_boxed_module(&mut self, mut module: Box<dyn AppModule>) -> Result<(), AppError> {
        let name = module.name().to_string();
        if self.modules.iter().any(|m| m.name() == name) {
            return Err(AppError::ModuleAlreadyAttached(name));
        }

        if let Some(aware) = module.as_service_aware() {
            aware.set_services(self.services.clone());
        }
        if let Some(lifecycle) = module.as_lifecycle() {
            lifecycle.on_use().map_err(|source| AppError::Hook {
                module: name.clone(),
                hook: "on_use",
                source,
            })?;
        }

        self.router.atomic(|router| module.build_routes(router))?;
        tracing::info!(module = %name, "Module attached");
        self.modules.push(module);
        Ok(())
    }

    /// Global middleware, outermost around every route.
    pub fn use_middleware(&mut self, middlewares: impl IntoIterator<Item = Middleware>) {
        self.router.use_middleware(middlewares);
    }

    /// Serve files from `dir` under `url_prefix`.
    pub fn static_files(
        &mut self,
        url_prefix: &str,
        dir: impl AsRef<Path>,
        middlewares: &[Middleware],
    ) -> Result<(), AppError> {
        self.router.static_files(url_prefix, dir, middlewares)?;
        Ok(())
    }

    /// Direct access to the router for routes that belong to no module.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Names of the attached modules in attachment order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn register_service<T>(&self, name: impl Into<String>, service: T)
    where
        T: std::any::Any + Send + Sync,
    {
        self.services.register(name, service);
    }

    pub fn get_service<T>(&self, name: &str) -> Option<T>
    where
        T: std::any::Any + Clone,
    {
        self.services.get(name)
    }

    /// Panics when the service is missing. Startup wiring only.
    pub fn must_get_service<T>(&self, name: &str) -> T
    where
        T: std::any::Any + Clone,
    {
        self.services.must_get(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.has(name)
    }

    /// Freeze routes and middleware into the served axum router.
    ///
    /// Does not run `on_start` hooks; [`run`](Self::run) does.
    pub fn into_service(self) -> Result<axum::Router, AppError> {
        Ok(self
            .router
            .into_service()?
            .layer(TraceLayer::new_for_http()))
    }

    /// Run `on_start` hooks, freeze the router and serve until shutdown.
    pub async fn run(mut self) -> Result<(), AppError> {
        self.start_modules()?;

        let App {
            router,
            modules,
            bind_address,
            serve,
            shutdown,
            ..
        } = self;

        let service = router.into_service()?.layer(TraceLayer::new_for_http());
        tracing::info!(
            address = %bind_address,
            modules = modules.len(),
            "Starting listener"
        );

        serve(bind_address, service, server::shutdown_signal(shutdown)).await?;
        Ok(())
    }

    /// Run every module's `on_start` hook in attachment order.
    ///
    /// [`run`](Self::run) calls this itself; exposed for hosts that serve
    /// the router from [`into_service`](Self::into_service) on their own.
    pub fn start_modules(&mut self) -> Result<(), AppError> {
        for module in &mut self.modules {
            let name = module.name().to_string();
            if let Some(lifecycle) = module.as_lifecycle() {
                lifecycle.on_start().map_err(|source| AppError::Hook {
                    module: name.clone(),
                    hook: "on_start",
                    source,
                })?;
                tracing::debug!(module = %name, "Module started");
            }
        }
        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
