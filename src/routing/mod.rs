//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (startup):
//!     "<METHOD> <path>"
//!     → pattern.rs (parse, validate, exact path or prefix)
//!     → router.rs (duplicate check, route middleware chain, table insert)
//!
//! Freeze (before the listener starts):
//!     table + global middleware
//!     → axum::Router (one MethodRouter per exact path)
//!     → prefix table behind the method and router fallbacks
//!
//! Dispatch (per request):
//!     axum match → composed handler
//!     no match / no method → most specific prefix → handler | 405 | 404
//! ```
//!
//! # Design Decisions
//! - Table is append-only during startup and consumed when frozen
//! - Deterministic: the same request always reaches the same handler
//! - Configuration errors surface at registration, never at request time

pub mod pattern;
pub mod router;

pub use pattern::{Pattern, PatternError};
pub use router::{Router, RouterError, DEFAULT_BODY_LIMIT};
