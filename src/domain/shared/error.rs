//! Domain errors

use crate::domain::directory::DirectoryError;
use crate::domain::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Whether the service must stop on this error
    pub fn is_fatal(&self) -> bool {
        match self {
            DomainError::Directory(err) => err.is_fatal(),
            DomainError::Internal(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(DomainError::from(DirectoryError::DuplicateExtension(1001)).is_fatal());
        assert!(!DomainError::from(DirectoryError::Unindexable("0".into())).is_fatal());
        assert!(!DomainError::from(StoreError::Unavailable("down".into())).is_fatal());
        assert_eq!(
            DomainError::from(DirectoryError::DuplicateAlias("bob".into())).to_string(),
            "Duplicate extension alias: bob"
        );
    }
}
