//! Directory errors

use thiserror::Error;

/// Integrity violations of the directory index
///
/// Lookup misses are never errors; they are reported as `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Duplicate extension number: {0}")]
    DuplicateExtension(i64),

    #[error("Duplicate extension alias: {0}")]
    DuplicateAlias(String),

    #[error("Extension {0} has neither a number nor an alias")]
    Unindexable(String),
}

impl DirectoryError {
    /// Whether this error must stop the service
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DirectoryError::Unindexable(_))
    }
}
