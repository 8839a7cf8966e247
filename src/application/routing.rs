//! Target resolution
//!
//! Answers "where is X reachable right now" from the directory, and reads
//! forwarding rules through the store boundary.

use crate::domain::directory::{Directory, Endpoint, Registry};
use crate::domain::store::{DirectoryStore, ForwardKind, StoreError};
use std::cmp::Reverse;
use tracing::debug;

/// Resolved account and its reachable endpoints, most recently refreshed first
#[derive(Debug, Clone)]
pub struct RouteTarget {
    pub registry: Registry,
    pub endpoints: Vec<Endpoint>,
}

impl RouteTarget {
    pub fn is_reachable(&self) -> bool {
        !self.endpoints.is_empty()
    }
}

/// Resolve a dialed number or alias; `None` when no such account exists
pub fn resolve_target(directory: &Directory, target: &str) -> Option<RouteTarget> {
    let registry = directory.lookup(target)?;
    let mut endpoints: Vec<Endpoint> = registry
        .endpoints()
        .filter(|ep| !ep.has_expired())
        .cloned()
        .collect();
    endpoints.sort_by_key(|ep| Reverse(ep.updated()));

    debug!(
        "Resolved {} to {} with {} live endpoint(s)",
        target,
        registry,
        endpoints.len()
    );
    Some(RouteTarget {
        registry,
        endpoints,
    })
}

/// Forwarding destination of an extension for one condition
pub async fn forward_target(
    store: &dyn DirectoryStore,
    number: i64,
    kind: ForwardKind,
) -> Result<Option<String>, StoreError> {
    let rows = store.forwards(number).await?;
    Ok(rows
        .into_iter()
        .find(|row| row.forward_kind() == Some(kind))
        .map(|row| row.target)
        .filter(|target| !target.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::{Address, ContextId};
    use crate::domain::store::{ExtensionRow, ForwardRow, MockDirectoryStore};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_live_endpoints_newest_first() {
        let directory = Directory::new();
        let id = directory
            .create_registry(ExtensionRow::new(1001).with_alias("alice"))
            .unwrap();
        let ctx = ContextId::new();
        let addr = |host: &str| Address::parse(host, 5060).unwrap();

        directory.register_endpoint(ctx, addr("10.0.0.1"), 30, id).unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        directory.register_endpoint(ctx, addr("10.0.0.2"), 600, id).unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        directory.register_endpoint(ctx, addr("10.0.0.3"), 600, id).unwrap();

        let target = resolve_target(&directory, "alice").unwrap();
        let hosts: Vec<Address> = target.endpoints.iter().map(|ep| ep.address()).collect();
        assert_eq!(hosts, vec![addr("10.0.0.3"), addr("10.0.0.2"), addr("10.0.0.1")]);

        tokio::time::advance(Duration::from_secs(30)).await;
        let target = resolve_target(&directory, "1001").unwrap();
        assert_eq!(target.endpoints.len(), 2);
        assert!(target.is_reachable());
    }

    #[test]
    fn test_unknown_and_unreachable() {
        let directory = Directory::new();
        directory.create_registry(ExtensionRow::new(1001)).unwrap();

        assert!(resolve_target(&directory, "2002").is_none());
        let target = resolve_target(&directory, "1001").unwrap();
        assert!(!target.is_reachable());
    }

    #[tokio::test]
    async fn test_forward_target() {
        let mut store = MockDirectoryStore::new();
        store.expect_forwards().returning(|number| {
            Ok(vec![
                ForwardRow {
                    number,
                    kind: "busy".to_string(),
                    target: "2001".to_string(),
                },
                ForwardRow {
                    number,
                    kind: "na".to_string(),
                    target: "voicemail".to_string(),
                },
            ])
        });

        assert_eq!(
            forward_target(&store, 1001, ForwardKind::NoAnswer).await.unwrap(),
            Some("voicemail".to_string())
        );
        assert_eq!(forward_target(&store, 1001, ForwardKind::All).await.unwrap(), None);
    }
}
