//! Domain layer - registration directory core
//!
//! This layer contains:
//! - Events: normalized view of SIP stack events
//! - Directory: registries and endpoints with their indexes
//! - Contexts: transport abstraction endpoints are scoped to
//! - Store: port to the persisted directory

pub mod context;
pub mod directory;
pub mod event;
pub mod shared;
pub mod store;

// Re-export commonly used types
pub use shared::{DomainError, Result};
