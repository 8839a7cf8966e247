//! Directory index
//!
//! One lock guards the whole index: extension numbers, aliases and the
//! per-context address map. Registries are only visible once they are
//! present in every map they belong to.

use super::endpoint::{Endpoint, EndpointKey};
use super::error::DirectoryError;
use super::registry::{Registry, RegistryId};
use crate::domain::shared::value_objects::{Address, CallId, ContextId};
use crate::domain::store::ExtensionRow;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Outcome of [`Directory::reload`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct DirectoryState {
    next_id: u64,
    // ids are allocated monotonically, so this iterates in insertion order
    registries: BTreeMap<RegistryId, Registry>,
    extensions: HashMap<i64, RegistryId>,
    aliases: HashMap<String, RegistryId>,
    endpoints: HashMap<ContextId, HashMap<Address, RegistryId>>,
}

impl DirectoryState {
    fn allocate(&mut self) -> RegistryId {
        self.next_id += 1;
        RegistryId::from_raw(self.next_id)
    }

    fn index(&mut self, registry: Registry) -> Result<RegistryId, DirectoryError> {
        if let Some(number) = registry.number() {
            if self.extensions.contains_key(&number) {
                return Err(DirectoryError::DuplicateExtension(number));
            }
        }
        if let Some(alias) = registry.alias() {
            if self.aliases.contains_key(alias) {
                return Err(DirectoryError::DuplicateAlias(alias.to_string()));
            }
        }

        let id = registry.id();
        if let Some(number) = registry.number() {
            self.extensions.insert(number, id);
        }
        if let Some(alias) = registry.alias() {
            self.aliases.insert(alias.to_string(), id);
        }
        for key in registry.endpoints.keys() {
            self.endpoints
                .entry(key.context)
                .or_default()
                .insert(key.address, id);
        }
        self.registries.insert(id, registry);
        Ok(id)
    }

    fn find(&self, target: &str) -> Option<RegistryId> {
        if target.is_empty() {
            return None;
        }

        target
            .parse::<i64>()
            .ok()
            .filter(|n| *n > 0)
            .and_then(|n| self.extensions.get(&n).copied())
            .or_else(|| self.aliases.get(target).copied())
    }

    fn owner(&self, key: &EndpointKey) -> Option<RegistryId> {
        self.endpoints
            .get(&key.context)
            .and_then(|addresses| addresses.get(&key.address))
            .copied()
    }

    fn endpoint(&self, key: &EndpointKey) -> Option<&Endpoint> {
        let owner = self.owner(key)?;
        self.registries.get(&owner)?.endpoints.get(key)
    }

    fn endpoint_mut(&mut self, key: &EndpointKey) -> Option<&mut Endpoint> {
        let owner = self.owner(key)?;
        self.registries.get_mut(&owner)?.endpoints.get_mut(key)
    }

    fn unindex_endpoint(&mut self, key: &EndpointKey) {
        if let Some(addresses) = self.endpoints.get_mut(&key.context) {
            addresses.remove(&key.address);
            if addresses.is_empty() {
                self.endpoints.remove(&key.context);
            }
        }
    }

    fn remove_endpoint(&mut self, key: &EndpointKey) -> Option<Endpoint> {
        let owner = self.owner(key)?;
        self.unindex_endpoint(key);
        self.registries.get_mut(&owner)?.endpoints.remove(key)
    }

    fn remove_registry(&mut self, id: RegistryId) -> Option<Registry> {
        let registry = self.registries.remove(&id)?;

        for key in registry.endpoints.keys() {
            self.unindex_endpoint(key);
        }
        if let Some(number) = registry.number() {
            if self.extensions.get(&number) == Some(&id) {
                self.extensions.remove(&number);
            }
        }
        if let Some(alias) = registry.alias() {
            if self.aliases.get(alias) == Some(&id) {
                self.aliases.remove(alias);
            }
        }
        Some(registry)
    }

    // registry a reloaded row should carry over from
    fn previous(&self, row: &ExtensionRow) -> Option<RegistryId> {
        if row.number > 0 {
            return self.extensions.get(&row.number).copied();
        }
        let alias = row.alias.as_deref().map(str::trim)?;
        self.aliases
            .get(alias)
            .copied()
            .filter(|id| {
                self.registries
                    .get(id)
                    .map(|r| r.number().is_none())
                    .unwrap_or(false)
            })
    }
}

/// Shared directory of registries and their endpoints
pub struct Directory {
    state: RwLock<DirectoryState>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DirectoryState::default()),
        }
    }

    /// Build and index a registry from an extension row
    pub fn create_registry(&self, row: ExtensionRow) -> Result<RegistryId, DirectoryError> {
        let mut state = self.state.write();
        let id = state.allocate();
        let registry = Registry::from_row(id, row)?;
        let name = registry.to_string();
        state.index(registry)?;
        info!("Created {} as {}", name, id);
        Ok(id)
    }

    /// Remove a registry and every endpoint it owns
    pub fn destroy_registry(&self, id: RegistryId) -> Option<Registry> {
        let registry = self.state.write().remove_registry(id)?;
        info!(
            "Destroyed {} with {} endpoint(s)",
            registry,
            registry.endpoint_count()
        );
        Some(registry)
    }

    /// Find a registry by extension number, then by alias
    pub fn lookup(&self, target: &str) -> Option<Registry> {
        let state = self.state.read();
        let id = state.find(target)?;
        state.registries.get(&id).cloned()
    }

    pub fn registry(&self, id: RegistryId) -> Option<Registry> {
        self.state.read().registries.get(&id).cloned()
    }

    /// Snapshot of all registries
    pub fn list_registries(&self) -> Vec<Registry> {
        self.state.read().registries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().registries.is_empty()
    }

    /// Register or refresh the endpoint at `address` on `context`.
    ///
    /// Returns `None` if the registry is unknown.
    pub fn register_endpoint(
        &self,
        context: ContextId,
        address: Address,
        expires: u32,
        registry: RegistryId,
    ) -> Option<Endpoint> {
        let mut state = self.state.write();
        if !state.registries.contains_key(&registry) {
            debug!("Cannot register {} for unknown registry {}", address, registry);
            return None;
        }

        let key = EndpointKey::new(context, address);
        let endpoint = match state.owner(&key) {
            Some(owner) if owner == registry => {
                let endpoint = state.endpoint_mut(&key)?;
                endpoint.refresh(expires);
                debug!("Refreshed {} for {} ({}s)", endpoint, registry, expires);
                return Some(endpoint.clone());
            }
            Some(owner) => {
                let mut endpoint = state.remove_endpoint(&key)?;
                info!("{} moved from {} to {}", endpoint, owner, registry);
                endpoint.rebind(registry);
                endpoint.refresh(expires);
                endpoint
            }
            None => Endpoint::new(registry, context, address, expires),
        };

        state
            .endpoints
            .entry(context)
            .or_default()
            .insert(address, registry);
        let owner = state.registries.get_mut(&registry)?;
        owner.endpoints.insert(key, endpoint.clone());
        info!("Registered {} for {} ({}s)", endpoint, owner, expires);
        Some(endpoint)
    }

    pub fn find_endpoint(&self, context: ContextId, address: Address) -> Option<Endpoint> {
        self.state
            .read()
            .endpoint(&EndpointKey::new(context, address))
            .cloned()
    }

    /// Refresh an existing endpoint without creating one
    pub fn refresh_endpoint(
        &self,
        context: ContextId,
        address: Address,
        expires: u32,
    ) -> Option<Endpoint> {
        let mut state = self.state.write();
        let endpoint = state.endpoint_mut(&EndpointKey::new(context, address))?;
        endpoint.refresh(expires);
        Some(endpoint.clone())
    }

    /// De-register one endpoint
    pub fn remove_endpoint(&self, context: ContextId, address: Address) -> Option<Endpoint> {
        let endpoint = self
            .state
            .write()
            .remove_endpoint(&EndpointKey::new(context, address))?;
        info!("Removed {} from {}", endpoint, endpoint.registry());
        Some(endpoint)
    }

    /// De-register every endpoint a registry holds on one context
    pub fn remove_endpoints(&self, registry: RegistryId, context: ContextId) -> Vec<Endpoint> {
        let mut state = self.state.write();
        let keys: Vec<EndpointKey> = match state.registries.get(&registry) {
            Some(owner) => owner
                .endpoints
                .keys()
                .filter(|key| key.context == context)
                .copied()
                .collect(),
            None => return Vec::new(),
        };

        let removed: Vec<Endpoint> = keys
            .iter()
            .filter_map(|key| state.remove_endpoint(key))
            .collect();
        if !removed.is_empty() {
            info!("Removed {} endpoint(s) of {}", removed.len(), registry);
        }
        removed
    }

    /// Remove every expired endpoint
    pub fn sweep_expired(&self) -> Vec<Endpoint> {
        let mut state = self.state.write();
        let expired: Vec<EndpointKey> = state
            .registries
            .values()
            .flat_map(|registry| registry.endpoints.values())
            .filter(|endpoint| endpoint.has_expired())
            .map(|endpoint| endpoint.key())
            .collect();

        let removed: Vec<Endpoint> = expired
            .iter()
            .filter_map(|key| state.remove_endpoint(key))
            .collect();
        if !removed.is_empty() {
            debug!("Swept {} expired endpoint(s)", removed.len());
        }
        removed
    }

    pub fn attach_call(&self, context: ContextId, address: Address, call: CallId) -> bool {
        self.state
            .write()
            .endpoint_mut(&EndpointKey::new(context, address))
            .map(|endpoint| endpoint.attach_call(call))
            .unwrap_or(false)
    }

    pub fn detach_call(&self, context: ContextId, address: Address, call: CallId) -> bool {
        self.state
            .write()
            .endpoint_mut(&EndpointKey::new(context, address))
            .map(|endpoint| endpoint.detach_call(call))
            .unwrap_or(false)
    }

    /// Drop a finished call from every endpoint; returns how many held it
    pub fn release_call(&self, call: CallId) -> usize {
        let mut state = self.state.write();
        state
            .registries
            .values_mut()
            .flat_map(|registry| registry.endpoints.values_mut())
            .map(|endpoint| endpoint.detach_call(call))
            .filter(|detached| *detached)
            .count()
    }

    /// Number of endpoints indexed for one context
    pub fn endpoint_count(&self, context: ContextId) -> usize {
        self.state
            .read()
            .endpoints
            .get(&context)
            .map(|addresses| addresses.len())
            .unwrap_or(0)
    }

    pub fn total_endpoints(&self) -> usize {
        self.state
            .read()
            .endpoints
            .values()
            .map(|addresses| addresses.len())
            .sum()
    }

    /// Replace the directory contents with a fresh extension listing.
    ///
    /// Registries whose number (or alias, for alias-only rows) is still
    /// listed keep their endpoints. On an integrity error nothing changes.
    pub fn reload(&self, rows: Vec<ExtensionRow>) -> Result<ReloadReport, DirectoryError> {
        let mut state = self.state.write();
        let mut next = DirectoryState {
            next_id: state.next_id,
            ..Default::default()
        };
        let mut report = ReloadReport::default();
        let mut retained: HashSet<RegistryId> = HashSet::new();

        for row in rows {
            let previous = state
                .previous(&row)
                .filter(|id| !retained.contains(id))
                .and_then(|id| state.registries.get(&id));

            let registry = match previous {
                Some(old) => {
                    let mut registry = old.clone();
                    if let Err(err) = registry.apply_row(row) {
                        warn!("Skipping extension row: {}", err);
                        report.skipped += 1;
                        continue;
                    }
                    retained.insert(registry.id());
                    report.updated += 1;
                    registry
                }
                None => {
                    let id = next.allocate();
                    match Registry::from_row(id, row) {
                        Ok(registry) => {
                            report.created += 1;
                            registry
                        }
                        Err(err) => {
                            warn!("Skipping extension row: {}", err);
                            report.skipped += 1;
                            continue;
                        }
                    }
                }
            };
            next.index(registry)?;
        }

        report.removed = state.registries.len() - retained.len();
        *state = next;
        info!(
            "Directory reloaded: {} created, {} updated, {} removed, {} skipped",
            report.created, report.updated, report.removed, report.skipped
        );
        Ok(report)
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
