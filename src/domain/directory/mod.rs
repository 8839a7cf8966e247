//! Registration directory
//!
//! Registries (accounts) indexed by extension number and alias, and their
//! endpoints indexed per context by network address.

pub mod endpoint;
pub mod error;
pub mod index;
pub mod registry;

pub use endpoint::{Endpoint, EndpointKey};
pub use error::DirectoryError;
pub use index::{Directory, ReloadReport};
pub use registry::{Registry, RegistryId};
