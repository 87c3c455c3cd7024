//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → TraceLayer spans per request (app)
//!     → request_id / logger middleware (http::middleware)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, text or JSON)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every handler via `x-request-id`

pub mod logging;
