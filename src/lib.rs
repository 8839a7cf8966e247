//! sipdir - SIP registration directory
//!
//! Tracks which accounts are registered from which network addresses and
//! answers where a number or alias is currently reachable.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
