//! Application layer - Use cases and application services
//!
//! This layer orchestrates the directory, the store and the authenticator:
//! - Registration processing
//! - Target resolution and forwarding
//! - Runtime settings and directory maintenance

pub mod manager;
pub mod registration;
pub mod routing;

pub use manager::{Manager, ManagerCommand, ManagerHandle, Settings};
pub use registration::{RegistrationDecision, RegistrationService, RejectReason};
pub use routing::{forward_target, resolve_target, RouteTarget};
