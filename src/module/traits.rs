//! Module capability traits.
//!
//! The application only relies on [`AppModule`]. Lifecycle hooks and
//! registry injection are optional capabilities, discovered at attach time
//! through the `as_*` accessors instead of being forced on every module.

use crate::routing::{Router, RouterError};
use crate::services::Services;

/// Error returned by a lifecycle hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// What the application needs from every module.
pub trait AppModule: Send {
    /// Name used in logs and to detect double attachment.
    fn name(&self) -> &str;

    /// Register this module's routes on `router`. Called once per attach.
    fn build_routes(&self, router: &mut Router) -> Result<(), RouterError>;

    /// The lifecycle capability, if this module has hooks.
    fn as_lifecycle(&mut self) -> Option<&mut dyn Lifecycle> {
        None
    }

    /// The registry-injection capability, if this module wants services.
    fn as_service_aware(&mut self) -> Option<&mut dyn ServiceAware> {
        None
    }
}

/// Optional startup hooks.
pub trait Lifecycle {
    /// Runs once when the module is attached, before its routes exist.
    fn on_use(&mut self) -> Result<(), HookError>;

    /// Runs once right before the listener starts accepting.
    fn on_start(&mut self) -> Result<(), HookError>;
}

/// Optional injection point for the application's [`Services`].
pub trait ServiceAware {
    /// Called before any hook runs and before routes are built.
    fn set_services(&mut self, services: Services);
}
