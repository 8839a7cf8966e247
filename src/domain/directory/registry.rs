//! Registry: one account/extension and its endpoints

use super::endpoint::{Endpoint, EndpointKey};
use super::error::DirectoryError;
use crate::domain::store::ExtensionRow;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Arena handle of a registry inside one directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RegistryId(u64);

impl RegistryId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Directory entry of one account
#[derive(Debug, Clone)]
pub struct Registry {
    id: RegistryId,
    record: ExtensionRow,
    number: Option<i64>,
    alias: Option<String>,
    display: String,
    pub(super) endpoints: HashMap<EndpointKey, Endpoint>,
}

impl Registry {
    /// Validate an extension row; rows with neither a positive number nor
    /// an alias cannot be indexed.
    pub(crate) fn from_row(id: RegistryId, row: ExtensionRow) -> Result<Self, DirectoryError> {
        let mut registry = Self {
            id,
            record: ExtensionRow::new(row.number),
            number: None,
            alias: None,
            display: String::new(),
            endpoints: HashMap::new(),
        };
        registry.apply_row(row)?;
        Ok(registry)
    }

    pub(crate) fn apply_row(&mut self, row: ExtensionRow) -> Result<(), DirectoryError> {
        let number = Some(row.number).filter(|n| *n > 0);
        let alias = row
            .alias
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        if number.is_none() && alias.is_none() {
            return Err(DirectoryError::Unindexable(row.number.to_string()));
        }

        self.display = row
            .display
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| alias.clone())
            .unwrap_or_else(|| row.number.to_string());
        self.number = number;
        self.alias = alias;
        self.record = row;
        Ok(())
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    /// Extension number, if positive
    pub fn number(&self) -> Option<i64> {
        self.number
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    /// Row the registry was built from
    pub fn data(&self) -> &ExtensionRow {
        &self.record
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// True unless at least one endpoint is still live
    pub fn has_expired(&self) -> bool {
        self.endpoints.values().all(|ep| ep.has_expired())
    }

    /// Longest remaining lifetime across endpoints, in seconds
    pub fn expires(&self) -> u64 {
        self.endpoints
            .values()
            .map(|ep| ep.expires())
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Registry({}", self.display)?;
        if let Some(number) = self.number {
            write!(f, ",number={}", number)?;
        }
        if let Some(alias) = &self.alias {
            write!(f, ",alias={}", alias)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::{Address, ContextId};
    use std::time::Duration;

    fn add(registry: &mut Registry, host: &str, expires: u32) {
        let ep = Endpoint::new(
            registry.id(),
            ContextId::new(),
            Address::parse(host, 5060).unwrap(),
            expires,
        );
        registry.endpoints.insert(ep.key(), ep);
    }

    #[test]
    fn test_display_fallback() {
        let id = RegistryId::from_raw(1);
        let full = Registry::from_row(id, ExtensionRow::new(1001).with_alias("alice").with_display("Alice"))
            .unwrap();
        assert_eq!(full.display(), "Alice");

        let aliased = Registry::from_row(id, ExtensionRow::new(1002).with_alias("bob")).unwrap();
        assert_eq!(aliased.display(), "bob");

        let bare = Registry::from_row(id, ExtensionRow::new(1003)).unwrap();
        assert_eq!(bare.display(), "1003");
        assert_eq!(bare.to_string(), "Registry(1003,number=1003)");
    }

    #[test]
    fn test_unindexable_row() {
        let id = RegistryId::from_raw(1);
        assert_eq!(
            Registry::from_row(id, ExtensionRow::new(0)).unwrap_err(),
            DirectoryError::Unindexable("0".to_string())
        );
        assert!(Registry::from_row(id, ExtensionRow::new(-4).with_alias("  ")).is_err());

        let alias_only = Registry::from_row(id, ExtensionRow::new(0).with_alias("operator")).unwrap();
        assert_eq!(alias_only.number(), None);
        assert_eq!(alias_only.alias(), Some("operator"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_registry_is_expired() {
        let registry = Registry::from_row(RegistryId::from_raw(1), ExtensionRow::new(1001)).unwrap();
        assert!(registry.has_expired());
        assert_eq!(registry.expires(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_aggregation() {
        let mut registry =
            Registry::from_row(RegistryId::from_raw(1), ExtensionRow::new(1001)).unwrap();
        add(&mut registry, "10.0.0.1", 30);
        add(&mut registry, "10.0.0.2", 120);

        assert!(!registry.has_expired());
        assert_eq!(registry.expires(), 120);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!registry.has_expired());
        assert_eq!(registry.expires(), 60);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(registry.has_expired());
        assert_eq!(registry.expires(), 0);
    }
}
