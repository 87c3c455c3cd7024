//! Process-wide service registry.
//!
//! # Data Flow
//! ```text
//! App::register_service("db", pool)
//!     → registry.rs (write lock, overwrite)
//!
//! ServiceAware module / hook / handler
//!     → Services::get::<Pool>("db") (read lock, type check)
//!     → Some(pool) | None (absent or other type)
//! ```
//!
//! # Design Decisions
//! - Independent of module dependency values
//! - Type mismatch is reported exactly like absence
//! - One reader/writer lock guards the whole map

pub mod registry;

pub use registry::Services;
