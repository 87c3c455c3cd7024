//! Built-in middleware.
//!
//! Ordinary [`Middleware`](crate::http::Middleware) values; install them
//! globally with `use_middleware` or per route.

pub mod logger;
pub mod recover;
pub mod request_id;

pub use logger::logger;
pub use recover::recover;
pub use request_id::{request_id, X_REQUEST_ID};
