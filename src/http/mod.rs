//! Request handling primitives.
//!
//! # Data Flow
//! ```text
//! axum request
//!     → context.rs (buffer body, capture params, fresh response writer)
//!     → chain.rs (global middleware → route middleware → handler)
//!     → context.rs (collected status/headers/body → axum response)
//! ```

pub mod chain;
pub mod context;
pub mod middleware;

pub use chain::{chain, handler, middleware, HandlerFunc, Middleware};
pub use context::{Context, ResponseWriter};
