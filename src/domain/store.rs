//! Directory store boundary
//!
//! The persisted directory (extensions, credentials, providers, forwarding)
//! is owned by an external store. The core only consumes materialized rows
//! and never awaits the store while holding the directory lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Extension (account) row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct ExtensionRow {
    pub number: i64,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
    /// Extension type, also used to mark suspended extensions
    #[serde(default, rename = "type")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "type"))]
    pub kind: Option<String>,
}

impl ExtensionRow {
    pub fn new(number: i64) -> Self {
        Self {
            number,
            alias: None,
            display: None,
            kind: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn with_display(mut self, display: &str) -> Self {
        self.display = Some(display.to_string());
        self
    }
}

/// Credential row used to authorize registrations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct AuthorizeRow {
    pub userid: String,
    /// Extension the credential registers
    pub number: Option<i64>,
    pub secret: String,
    /// Digest algorithm the secret is stored for ("MD5", "SHA-256", ...)
    #[serde(default = "default_digest")]
    pub digest: String,
    /// Last successful registration
    #[serde(default)]
    pub last: Option<DateTime<Utc>>,
}

fn default_digest() -> String {
    "MD5".to_string()
}

/// Outbound provider row, consumed by routing layered above the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct ProviderRow {
    pub contact: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub userid: String,
    pub passwd: String,
    pub display: String,
}

fn default_protocol() -> String {
    "UDP".to_string()
}

/// Forwarding rule of an extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForwardKind {
    Busy,
    NoAnswer,
    Away,
    All,
}

impl ForwardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardKind::Busy => "busy",
            ForwardKind::NoAnswer => "na",
            ForwardKind::Away => "away",
            ForwardKind::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "busy" => Some(ForwardKind::Busy),
            "na" | "noanswer" => Some(ForwardKind::NoAnswer),
            "away" => Some(ForwardKind::Away),
            "all" => Some(ForwardKind::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct ForwardRow {
    pub number: i64,
    #[serde(rename = "type")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "type"))]
    pub kind: String,
    pub target: String,
}

impl ForwardRow {
    pub fn forward_kind(&self) -> Option<ForwardKind> {
        ForwardKind::parse(&self.kind)
    }
}

/// Directory store trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// All extension rows
    async fn extensions(&self) -> Result<Vec<ExtensionRow>, StoreError>;

    /// Credential row for an authorizing user id
    async fn authorize(&self, userid: &str) -> Result<Option<AuthorizeRow>, StoreError>;

    /// Record a successful registration for a user id
    async fn touch_authorize(&self, userid: &str, when: DateTime<Utc>) -> Result<(), StoreError>;

    /// All provider rows
    async fn providers(&self) -> Result<Vec<ProviderRow>, StoreError>;

    /// Forwarding rows of one extension
    async fn forwards(&self, number: i64) -> Result<Vec<ForwardRow>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_kind_parse() {
        assert_eq!(ForwardKind::parse("BUSY"), Some(ForwardKind::Busy));
        assert_eq!(ForwardKind::parse("na"), Some(ForwardKind::NoAnswer));
        assert_eq!(ForwardKind::parse("sometimes"), None);
        assert_eq!(ForwardKind::NoAnswer.as_str(), "na");
    }

    #[test]
    fn test_row_defaults_from_json() {
        let row: AuthorizeRow =
            serde_json::from_str(r#"{"userid":"1001","number":1001,"secret":"s3cret"}"#).unwrap();
        assert_eq!(row.digest, "MD5");
        assert!(row.last.is_none());

        let ext: ExtensionRow = serde_json::from_str(r#"{"number":1001}"#).unwrap();
        assert_eq!(ext, ExtensionRow::new(1001));
    }
}
