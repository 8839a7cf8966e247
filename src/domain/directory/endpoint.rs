//! Registered endpoint

use super::registry::RegistryId;
use crate::domain::shared::value_objects::{Address, CallId, ContextId};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Index key of an endpoint: one per address within a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EndpointKey {
    pub context: ContextId,
    pub address: Address,
}

impl EndpointKey {
    pub fn new(context: ContextId, address: Address) -> Self {
        Self { context, address }
    }
}

/// One registered contact of a registry on one context
///
/// Values handed out by the directory are snapshots taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    registry: RegistryId,
    context: ContextId,
    address: Address,
    updated: Instant,
    expiration: Duration,
    calls: Vec<CallId>,
}

impl Endpoint {
    pub(crate) fn new(
        registry: RegistryId,
        context: ContextId,
        address: Address,
        expires: u32,
    ) -> Self {
        Self {
            registry,
            context,
            address,
            updated: Instant::now(),
            expiration: Duration::from_secs(expires as u64),
            calls: Vec::new(),
        }
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.context, self.address)
    }

    /// Owning registry
    pub fn registry(&self) -> RegistryId {
        self.registry
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn host(&self) -> IpAddr {
        self.address.host()
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// Last refresh
    pub fn updated(&self) -> Instant {
        self.updated
    }

    /// Lifetime measured from [`updated`](Self::updated)
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    pub fn has_expired(&self) -> bool {
        self.updated.elapsed() >= self.expiration
    }

    /// Remaining lifetime in whole seconds, rounded up; 0 exactly when expired
    pub fn expires(&self) -> u64 {
        let remaining = self.expiration.saturating_sub(self.updated.elapsed());
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    pub(crate) fn refresh(&mut self, expires: u32) {
        self.updated = Instant::now();
        self.expiration = Duration::from_secs(expires as u64);
    }

    /// Hand the endpoint over to another registry; call associations do not follow
    pub(crate) fn rebind(&mut self, registry: RegistryId) {
        self.registry = registry;
        self.calls.clear();
    }

    pub fn calls(&self) -> &[CallId] {
        &self.calls
    }

    pub(crate) fn attach_call(&mut self, call: CallId) -> bool {
        if self.calls.contains(&call) {
            return false;
        }
        self.calls.push(call);
        true
    }

    pub(crate) fn detach_call(&mut self, call: CallId) -> bool {
        let before = self.calls.len();
        self.calls.retain(|c| *c != call);
        self.calls.len() != before
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self.address)
    }
}
