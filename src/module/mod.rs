//! Modules: named, path-scoped bundles of routes sharing one dependency value.
//!
//! # Data Flow
//! ```text
//! Module::new("users", "/users", deps)
//!     → add_route / route (append Route<T>)
//!     → App::use_module
//!         → set_services → on_use hook → build_routes(router)
//!     → App::run
//!         → on_start hook → listener
//!
//! Per request:
//!     router → module middleware → closure(ctx) → read deps → handler(ctx, deps)
//! ```
//!
//! # Design Decisions
//! - The dependency type is fixed per module instance; the application
//!   only ever sees the type-erased [`AppModule`]
//! - Handlers get a clone of the dependency taken at request time, so
//!   mutations made by hooks or `set_dependencies` are always visible
//! - Hooks are optional closures; the lifecycle capability is reported only
//!   when at least one is configured

pub mod traits;

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::http::chain::{handler, Middleware};
use crate::http::context::Context;
use crate::routing::{Router, RouterError};
use crate::services::Services;

pub use traits::{AppModule, HookError, Lifecycle, ServiceAware};

/// Route handler receiving the module's dependency value.
pub type RouteHandler<T> = Arc<dyn Fn(Context, T) -> BoxFuture<'static, ()> + Send + Sync>;

type Hook<T> = Box<dyn FnMut(&mut T, &Services) -> Result<(), HookError> + Send>;

/// One route of a module. The path is relative to the module's base path.
pub struct Route<T> {
    pub method: Method,
    pub path: String,
    pub handler: RouteHandler<T>,
}

impl<T> Route<T> {
    pub fn new<F, Fut>(method: Method, path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            method,
            path: path.into(),
            handler: Arc::new(move |ctx, deps| -> BoxFuture<'static, ()> { Box::pin(f(ctx, deps)) }),
        }
    }

    pub fn get<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(Method::GET, path, f)
    }

    pub fn post<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(Method::POST, path, f)
    }

    pub fn put<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(Method::PUT, path, f)
    }

    pub fn delete<F, Fut>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(Method::DELETE, path, f)
    }
}

impl<T> Clone for Route<T> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            path: self.path.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<T> std::fmt::Debug for Route<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// A named group of routes under a base path, sharing one dependency value.
pub struct Module<T> {
    name: String,
    base_path: String,
    deps: Arc<RwLock<T>>,
    routes: Vec<Route<T>>,
    middlewares: Vec<Middleware>,
    services: Services,
    on_use: Option<Hook<T>>,
    on_start: Option<Hook<T>>,
}

impl<T> Module<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, base_path: impl Into<String>, deps: T) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
            deps: Arc::new(RwLock::new(deps)),
            routes: Vec::new(),
            middlewares: Vec::new(),
            services: Services::new(),
            on_use: None,
            on_start: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn routes(&self) -> &[Route<T>] {
        &self.routes
    }

    pub fn add_route(&mut self, route: Route<T>) {
        self.routes.push(route);
    }

    /// Builder form of [`add_route`](Self::add_route).
    pub fn route(mut self, route: Route<T>) -> Self {
        self.add_route(route);
        self
    }

    /// Middleware applied to every route of this module, inside global middleware.
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Replace the dependency value. Visible to handlers from the next request on.
    pub fn set_dependencies(&self, deps: T) {
        *self.deps.write().unwrap_or_else(PoisonError::into_inner) = deps;
    }

    /// Mutate the dependency value in place.
    pub fn update_dependencies(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.deps.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// A snapshot of the current dependency value.
    pub fn dependencies(&self) -> T {
        self.deps.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The registry injected by the application (empty until attached).
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Hook run when the module is attached, before its routes are built.
    pub fn on_use<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut T, &Services) -> Result<(), HookError> + Send + 'static,
    {
        self.on_use = Some(Box::new(hook));
        self
    }

    /// Hook run right before the listener starts.
    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut T, &Services) -> Result<(), HookError> + Send + 'static,
    {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Register every route as `"<METHOD> <base_path><path>"` on `router`,
    /// wrapped in this module's middleware.
    ///
    /// Either every route is registered or none is. Calling it twice
    /// registers everything twice, which the router rejects.
    pub fn build_routes(&self, router: &mut Router) -> Result<(), RouterError> {
        router.atomic(|router| {
            for route in &self.routes {
                let pattern = format!("{} {}", route.method, join_path(&self.base_path, &route.path));
                let deps = Arc::clone(&self.deps);
                let route_handler = Arc::clone(&route.handler);

                let h = handler(move |ctx| {
                    let snapshot = deps.read().unwrap_or_else(PoisonError::into_inner).clone();
                    route_handler(ctx, snapshot)
                });
                router.add_handler(&pattern, h, &self.middlewares)?;
            }
            Ok(())
        })?;

        tracing::info!(
            module = %self.name,
            base_path = %self.base_path,
            routes = self.routes.len(),
            "Module routes built"
        );
        Ok(())
    }

    fn run_hook(&mut self, start: bool) -> Result<(), HookError> {
        let hook = if start {
            self.on_start.as_mut()
        } else {
            self.on_use.as_mut()
        };
        match hook {
            Some(hook) => {
                let mut deps = self.deps.write().unwrap_or_else(PoisonError::into_inner);
                hook(&mut deps, &self.services)
            }
            None => Ok(()),
        }
    }
}

impl<T> AppModule for Module<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn build_routes(&self, router: &mut Router) -> Result<(), RouterError> {
        Module::build_routes(self, router)
    }

    fn as_lifecycle(&mut self) -> Option<&mut dyn Lifecycle> {
        if self.on_use.is_some() || self.on_start.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_service_aware(&mut self) -> Option<&mut dyn ServiceAware> {
        Some(self)
    }
}

impl<T> Lifecycle for Module<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn on_use(&mut self) -> Result<(), HookError> {
        self.run_hook(false)
    }

    fn on_start(&mut self) -> Result<(), HookError> {
        self.run_hook(true)
    }
}

impl<T> ServiceAware for Module<T> {
    fn set_services(&mut self, services: Services) {
        self.services = services;
    }
}

/// Join a base path and a route path without doubling the separator.
fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) if !path.is_empty() => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}
