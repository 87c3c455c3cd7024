//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (app::App::run):
//!     Attach modules → on_start hooks → Freeze router → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C or Shutdown::trigger → Stop accepting → Drain connections → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and reported before binding
//! - Listeners start last (traffic only when every module is ready)

pub mod shutdown;

pub use shutdown::Shutdown;
