//! Trellis: a modular HTTP application framework on Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!   App ──use_module──▶ Module<T> ──build_routes──▶ Router ──into_service──▶ axum::Router
//!    │                     │                          │
//!    │ Services ──inject──▶│ on_use / on_start        │ global middleware (outermost)
//!    │                                                │ module middleware
//!    └──run──▶ on_start hooks ──▶ ServeFn (TcpListener + graceful shutdown)
//! ```

pub mod app;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod module;
pub mod observability;
pub mod routing;
pub mod services;

pub use app::{App, AppError};
pub use config::AppConfig;
pub use http::{chain, handler, middleware, Context, HandlerFunc, Middleware, ResponseWriter};
pub use lifecycle::Shutdown;
pub use module::{AppModule, Lifecycle, Module, Route, ServiceAware};
pub use routing::{Pattern, Router, RouterError};
pub use services::Services;
