//! Route registration and dispatch.
//!
//! # Responsibilities
//! - Hold the registration table (pattern → composed handler)
//! - Reject duplicate or overlapping registrations at startup
//! - Apply route middleware at registration and global middleware at freeze
//! - Freeze the table into an `axum::Router` that performs the dispatch
//!
//! # Design Decisions
//! - Registration is a startup-phase operation; `into_service` consumes the
//!   router, so nothing can be registered once serving has begun
//! - Exact patterns are axum routes. Prefix patterns (trailing `/` or
//!   `{name...}`) live in a separate table consulted when axum finds no
//!   route, or no handler for the method, so `/users/` and `/users/{id}`
//!   coexist and the more specific pattern wins
//! - A GET registration also answers HEAD with the body stripped
//! - Routing misses do not run middleware
//! - Duplicates are errors rather than last-registration-wins
//! - A batch of registrations ([`Router::atomic`]) lands completely or not at all

use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::RawPathParams;
use axum::http::uri::PathAndQuery;
use axum::http::{header, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use futures_util::future::BoxFuture;
use thiserror::Error;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::http::chain::{chain, handler, HandlerFunc, Middleware};
use crate::http::context::Context;
use crate::routing::pattern::{Pattern, PatternError, Target};

/// Default cap on buffered request bodies (2 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Registration-time routing errors. All of them are configuration errors.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid route pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    #[error("route pattern {0:?} is already registered")]
    DuplicatePattern(String),

    #[error("method {0} cannot be routed")]
    UnsupportedMethod(Method),

    #[error("route pattern {pattern:?} overlaps an existing registration on {path:?}")]
    Conflict { pattern: String, path: String },

    #[error("route path {path:?} rejected by the multiplexer: {reason}")]
    Rejected { path: String, reason: String },
}

/// Handlers registered for one axum path.
#[derive(Clone, Default)]
struct PathEntry {
    methods: Vec<(Method, HandlerFunc)>,
    any: Option<HandlerFunc>,
}

impl PathEntry {
    fn accepts(&self, method: Option<&Method>) -> bool {
        match method {
            Some(method) => !self.methods.iter().any(|(m, _)| m == method),
            None => self.any.is_none(),
        }
    }
}

/// One segment of a prefix pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A subtree or `{name...}` registration.
#[derive(Clone)]
struct PrefixRoute {
    prefix: String,
    segments: Vec<Segment>,
    remainder: Option<String>,
    method: Option<Method>,
    handler: HandlerFunc,
}

impl PrefixRoute {
    fn new(prefix: String, remainder: Option<String>, method: Option<Method>, handler: HandlerFunc) -> Self {
        let segments = prefix
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self {
            prefix,
            segments,
            remainder,
            method,
            handler,
        }
    }

    /// Same segments, ignoring parameter names.
    fn same_shape(&self, other: &PrefixRoute) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|pair| match pair {
                (Segment::Literal(a), Segment::Literal(b)) => a == b,
                (Segment::Param(_), Segment::Param(_)) => true,
                _ => false,
            })
    }

    /// Parameters captured from `path`, or `None` when it is not below the prefix.
    fn capture(&self, path: &str) -> Option<Vec<(String, String)>> {
        let rest = path.strip_prefix('/')?;
        let mut parts = rest.splitn(self.segments.len() + 1, '/');
        let mut params = Vec::new();

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if part == literal => {}
                Segment::Param(name) if !part.is_empty() => {
                    params.push((name.clone(), part.to_string()));
                }
                _ => return None,
            }
        }

        let tail = parts.next()?;
        if let Some(name) = &self.remainder {
            params.push((name.clone(), tail.to_string()));
        }
        Some(params)
    }

    /// Longer prefixes, then more literal segments, then a named method win.
    fn rank(&self) -> (usize, usize, bool) {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        (self.segments.len(), literals, self.method.is_some())
    }
}

/// Outcome of a prefix lookup.
enum Lookup {
    Found {
        handler: HandlerFunc,
        params: Vec<(String, String)>,
        strip_body: bool,
    },
    NotAllowed(Vec<Method>),
    Missing,
}

/// Frozen prefix routes, global middleware already applied.
struct PrefixTable {
    routes: Vec<PrefixRoute>,
}

impl PrefixTable {
    fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let mut best: Option<((usize, usize, bool, bool), &PrefixRoute, Vec<(String, String)>, bool)> =
            None;
        let mut allowed = Vec::new();

        for route in &self.routes {
            let Some(params) = route.capture(path) else {
                continue;
            };
            let strip_body = match &route.method {
                None => false,
                Some(m) if m == method => false,
                Some(m) if *method == Method::HEAD && *m == Method::GET => true,
                Some(m) => {
                    allowed.push(m.clone());
                    continue;
                }
            };

            let (len, literals, named) = route.rank();
            let rank = (len, literals, named, !strip_body);
            if best.as_ref().map_or(true, |(current, ..)| rank > *current) {
                best = Some((rank, route, params, strip_body));
            }
        }

        match best {
            Some((_, route, params, strip_body)) => Lookup::Found {
                handler: Arc::clone(&route.handler),
                params,
                strip_body,
            },
            None if !allowed.is_empty() => Lookup::NotAllowed(allowed),
            None => Lookup::Missing,
        }
    }
}

/// Registration state; cloned to roll back a failed batch.
#[derive(Clone, Default)]
struct RouteTable {
    exact: BTreeMap<String, PathEntry>,
    prefixes: Vec<PrefixRoute>,
    patterns: Vec<Pattern>,
    keys: HashSet<Pattern>,
}

/// Method + path dispatch table with middleware support.
pub struct Router {
    table: RouteTable,
    global: Vec<Middleware>,
    body_limit: usize,
}

impl Router {
    pub fn new() -> Self {
        Self {
            table: RouteTable::default(),
            global: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Set the maximum request body size buffered into a [`Context`].
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Register `handler` under `pattern`, wrapped in `middlewares`.
    ///
    /// The first middleware observes the request first. Registering the same
    /// pattern twice, or a pattern that lands on an already claimed
    /// method + path, fails.
    pub fn add_handler(
        &mut self,
        pattern: &str,
        handler: HandlerFunc,
        middlewares: &[Middleware],
    ) -> Result<(), RouterError> {
        let pattern = Pattern::parse(pattern)?;
        self.insert(pattern, chain(handler, middlewares))
    }

    /// Register `pattern` and, unless it already ends in `/`, its
    /// trailing-slash variant, so `/foo` and `/foo/` reach the same handler.
    pub fn handle(
        &mut self,
        pattern: &str,
        handler: HandlerFunc,
        middlewares: &[Middleware],
    ) -> Result<(), RouterError> {
        let pattern = Pattern::parse(pattern)?;
        tracing::info!(pattern = %pattern, "Serving route(s)");

        let composed = chain(handler, middlewares);
        let slash = pattern.with_trailing_slash();
        self.atomic(|router| {
            router.insert(pattern, composed.clone())?;
            if let Some(slash) = slash {
                router.insert(slash, composed)?;
            }
            Ok(())
        })
    }

    /// Serve files from `dir` under `url_prefix` for GET and HEAD.
    ///
    /// The prefix is normalised to end in exactly one `/` and stripped before
    /// the file lookup. Traversal outside `dir` is rejected by `ServeDir`.
    pub fn static_files(
        &mut self,
        url_prefix: &str,
        dir: impl AsRef<Path>,
        middlewares: &[Middleware],
    ) -> Result<(), RouterError> {
        let prefix = format!("{}/", url_prefix.trim_end_matches('/'));
        let serve_dir = ServeDir::new(dir.as_ref());

        tracing::info!(prefix = %prefix, dir = %dir.as_ref().display(), "Serving static files");

        let strip = prefix.clone();
        let files = handler(move |ctx| serve_file(serve_dir.clone(), strip.clone(), ctx));
        self.atomic(|router| {
            router.add_handler(&format!("GET {prefix}"), files.clone(), middlewares)?;
            router.add_handler(&format!("HEAD {prefix}"), files, middlewares)
        })
    }

    /// Run a batch of registrations. When `f` fails, every route it
    /// registered is removed again.
    pub fn atomic<F>(&mut self, f: F) -> Result<(), RouterError>
    where
        F: FnOnce(&mut Router) -> Result<(), RouterError>,
    {
        let saved = self.table.clone();
        let result = f(self);
        if result.is_err() {
            self.table = saved;
        }
        result
    }

    /// Append global middleware, run outermost around every route.
    pub fn use_middleware(&mut self, middlewares: impl IntoIterator<Item = Middleware>) {
        self.global.extend(middlewares);
    }

    /// Registered patterns in registration order.
    pub fn patterns(&self) -> &[Pattern] {
        &self.table.patterns
    }

    pub fn route_count(&self) -> usize {
        self.table.patterns.len()
    }

    pub fn has_pattern(&self, pattern: &str) -> bool {
        Pattern::parse(pattern)
            .map(|p| self.table.keys.contains(&p))
            .unwrap_or(false)
    }

    /// Freeze the table into an axum router.
    ///
    /// Global middleware is composed here, outermost. Path conflicts only the
    /// multiplexer can see (e.g. `/a/{x}` next to `/a/{y}`) surface as
    /// [`RouterError::Rejected`].
    pub fn into_service(self) -> Result<axum::Router, RouterError> {
        let Router {
            table,
            global,
            body_limit,
        } = self;

        let prefixes = Arc::new(PrefixTable {
            routes: table
                .prefixes
                .into_iter()
                .map(|mut route| {
                    route.handler = chain(route.handler, &global);
                    route
                })
                .collect(),
        });

        let mut service = axum::Router::new();
        for (path, entry) in table.exact {
            let mut method_router = MethodRouter::new();
            let mut allowed = Vec::with_capacity(entry.methods.len());
            for (method, h) in entry.methods {
                let filter = method_filter(&method)?;
                method_router = method_router.on(filter, endpoint(chain(h, &global), body_limit));
                allowed.push(method);
            }
            method_router = match entry.any {
                Some(h) => method_router.fallback(endpoint(chain(h, &global), body_limit)),
                None => method_router.fallback(fall_through(Arc::clone(&prefixes), allowed, body_limit)),
            };

            let route_path = path.clone();
            service = panic::catch_unwind(AssertUnwindSafe(move || {
                service.route(&route_path, method_router)
            }))
            .map_err(|payload| RouterError::Rejected {
                path,
                reason: panic_reason(payload),
            })?;
        }

        Ok(service.fallback(fall_through(prefixes, Vec::new(), body_limit)))
    }

    fn insert(&mut self, pattern: Pattern, handler: HandlerFunc) -> Result<(), RouterError> {
        if self.table.keys.contains(&pattern) {
            return Err(RouterError::DuplicatePattern(pattern.to_string()));
        }
        if let Some(method) = pattern.method() {
            method_filter(method)?;
        }

        match pattern.target() {
            Target::Exact(path) => {
                let entry = self.table.exact.entry(path.clone()).or_default();
                if !entry.accepts(pattern.method()) {
                    return Err(RouterError::Conflict {
                        pattern: pattern.to_string(),
                        path,
                    });
                }
                match pattern.method() {
                    Some(method) => entry.methods.push((method.clone(), handler)),
                    None => entry.any = Some(handler),
                }
            }
            Target::Prefix { prefix, remainder } => {
                let route = PrefixRoute::new(prefix, remainder, pattern.method().cloned(), handler);
                let clash = self
                    .table
                    .prefixes
                    .iter()
                    .any(|existing| existing.method == route.method && existing.same_shape(&route));
                if clash {
                    return Err(RouterError::Conflict {
                        pattern: pattern.to_string(),
                        path: route.prefix,
                    });
                }
                self.table.prefixes.push(route);
            }
        }

        tracing::debug!(pattern = %pattern, "Route registered");
        self.table.keys.insert(pattern.clone());
        self.table.patterns.push(pattern);
        Ok(())
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("patterns", &self.table.patterns)
            .field("global_middleware", &self.global.len())
            .finish()
    }
}

fn method_filter(method: &Method) -> Result<MethodFilter, RouterError> {
    MethodFilter::try_from(method.clone())
        .map_err(|_| RouterError::UnsupportedMethod(method.clone()))
}

fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown reason".to_string())
}

/// Adapt a composed handler into an axum handler.
fn endpoint(
    h: HandlerFunc,
    body_limit: usize,
) -> impl Fn(Result<RawPathParams, RawPathParamsRejection>, Request<Body>) -> BoxFuture<'static, Response>
       + Clone
       + Send
       + Sync
       + 'static {
    move |params, req| {
        let params: Vec<(String, String)> = params
            .map(|params| {
                params
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Box::pin(dispatch(h.clone(), body_limit, params, req))
    }
}

/// Handler for requests axum could not serve itself: no route for the path,
/// or no handler for the method on an exact path whose methods are `allowed`.
/// Consults the prefix table before answering 404 or 405.
fn fall_through(
    prefixes: Arc<PrefixTable>,
    allowed: Vec<Method>,
    body_limit: usize,
) -> impl Fn(Request<Body>) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    move |req: Request<Body>| -> BoxFuture<'static, Response> {
        let lookup = prefixes.lookup(req.method(), req.uri().path());
        match lookup {
            Lookup::Found {
                handler,
                params,
                strip_body,
            } => Box::pin(async move {
                let response = dispatch(handler, body_limit, params, req).await;
                if strip_body {
                    let (parts, _) = response.into_parts();
                    Response::from_parts(parts, Body::empty())
                } else {
                    response
                }
            }),
            Lookup::NotAllowed(mut methods) => {
                methods.extend(allowed.iter().cloned());
                Box::pin(std::future::ready(method_not_allowed(methods)))
            }
            Lookup::Missing if !allowed.is_empty() => {
                Box::pin(std::future::ready(method_not_allowed(allowed.clone())))
            }
            Lookup::Missing => Box::pin(std::future::ready(StatusCode::NOT_FOUND.into_response())),
        }
    }
}

fn method_not_allowed(mut methods: Vec<Method>) -> Response {
    if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
        methods.push(Method::HEAD);
    }
    methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    methods.dedup();

    let allow = methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(",");
    (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, allow)]).into_response()
}

async fn dispatch(
    h: HandlerFunc,
    body_limit: usize,
    params: Vec<(String, String)>,
    req: Request<Body>,
) -> Response {
    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, body_limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = %parts.uri.path(), error = %err, "Request body rejected");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let ctx = Context::with_params(parts, body, params);
    h(ctx.clone()).await;
    ctx.into_response()
}

async fn serve_file(serve_dir: ServeDir, prefix: String, ctx: Context) {
    let mut req = ctx.to_request();

    // Keep the leading slash of the remainder: "/static/a.txt" → "/a.txt".
    let rest = ctx.path().strip_prefix(&prefix[..prefix.len() - 1]).unwrap_or("/");
    let stripped = match ctx.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest.to_string(),
    };
    match PathAndQuery::try_from(stripped).map(Uri::from) {
        Ok(uri) => *req.uri_mut() = uri,
        Err(_) => {
            ctx.writer().write_header(StatusCode::NOT_FOUND);
            return;
        }
    }

    match serve_dir.oneshot(req).await {
        Ok(response) => ctx.writer().forward(response.map(Body::new)),
        Err(never) => match never {},
    }
}
