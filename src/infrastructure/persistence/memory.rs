//! In-memory directory store
//!
//! Holds the directory rows in process, optionally seeded from a JSON
//! document. Used by tests and by deployments without a database.

use crate::domain::store::{
    AuthorizeRow, DirectoryStore, ExtensionRow, ForwardRow, ProviderRow, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Serialized form of a memory store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySnapshot {
    pub extensions: Vec<ExtensionRow>,
    pub authorize: Vec<AuthorizeRow>,
    pub providers: Vec<ProviderRow>,
    pub forwards: Vec<ForwardRow>,
}

#[derive(Debug, Default)]
pub struct MemoryDirectoryStore {
    rows: RwLock<DirectorySnapshot>,
}

impl MemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        Self {
            rows: RwLock::new(snapshot),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: DirectorySnapshot =
            serde_json::from_str(json).map_err(|e| StoreError::InvalidRow(e.to_string()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let store = Self::from_json(&json)?;
        info!(
            "Loaded {} extension(s) from {}",
            store.rows.read().extensions.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn set_extensions(&self, rows: Vec<ExtensionRow>) {
        self.rows.write().extensions = rows;
    }

    pub fn add_extension(&self, row: ExtensionRow) {
        self.rows.write().extensions.push(row);
    }

    /// Insert or replace the credential row of `row.userid`
    pub fn add_authorize(&self, row: AuthorizeRow) {
        let mut rows = self.rows.write();
        rows.authorize.retain(|r| r.userid != row.userid);
        rows.authorize.push(row);
    }

    pub fn add_forward(&self, row: ForwardRow) {
        self.rows.write().forwards.push(row);
    }

    pub fn add_provider(&self, row: ProviderRow) {
        self.rows.write().providers.push(row);
    }

    pub fn snapshot(&self) -> DirectorySnapshot {
        self.rows.read().clone()
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectoryStore {
    async fn extensions(&self) -> Result<Vec<ExtensionRow>, StoreError> {
        Ok(self.rows.read().extensions.clone())
    }

    async fn authorize(&self, userid: &str) -> Result<Option<AuthorizeRow>, StoreError> {
        Ok(self
            .rows
            .read()
            .authorize
            .iter()
            .find(|r| r.userid == userid)
            .cloned())
    }

    async fn touch_authorize(&self, userid: &str, when: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(row) = self
            .rows
            .write()
            .authorize
            .iter_mut()
            .find(|r| r.userid == userid)
        {
            row.last = Some(when);
        }
        Ok(())
    }

    async fn providers(&self) -> Result<Vec<ProviderRow>, StoreError> {
        Ok(self.rows.read().providers.clone())
    }

    async fn forwards(&self, number: i64) -> Result<Vec<ForwardRow>, StoreError> {
        Ok(self
            .rows
            .read()
            .forwards
            .iter()
            .filter(|r| r.number == number)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"{
        "extensions": [
            {"number": 1001, "alias": "alice", "display": "Alice"},
            {"number": 1002}
        ],
        "authorize": [
            {"userid": "alice", "number": 1001, "secret": "s3cret"}
        ],
        "forwards": [
            {"number": 1001, "type": "busy", "target": "1002"},
            {"number": 1002, "type": "all", "target": "1001"}
        ]
    }"#;

    #[tokio::test]
    async fn test_seeded_rows() {
        let store = MemoryDirectoryStore::from_json(SEED).unwrap();

        assert_eq!(store.extensions().await.unwrap().len(), 2);
        assert!(store.providers().await.unwrap().is_empty());
        assert_eq!(store.forwards(1001).await.unwrap().len(), 1);

        let row = store.authorize("alice").await.unwrap().unwrap();
        assert_eq!(row.number, Some(1001));
        assert_eq!(row.digest, "MD5");
        assert!(store.authorize("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_authorize() {
        let store = MemoryDirectoryStore::from_json(SEED).unwrap();
        let now = Utc::now();
        store.touch_authorize("alice", now).await.unwrap();
        store.touch_authorize("nobody", now).await.unwrap();

        let row = store.authorize("alice").await.unwrap().unwrap();
        assert_eq!(row.last, Some(now));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            MemoryDirectoryStore::from_json("{\"extensions\": 4}"),
            Err(StoreError::InvalidRow(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(matches!(
            MemoryDirectoryStore::load("/nonexistent/directory.json").await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
