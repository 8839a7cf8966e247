//! REGISTER processing
//!
//! Authenticates a registration event against the directory store and
//! applies its contacts to the directory.

use super::manager::Settings;
use crate::domain::directory::{Directory, Endpoint, RegistryId};
use crate::domain::event::{Event, SipMethod};
use crate::domain::shared::value_objects::{Address, Contact, ContextId};
use crate::domain::shared::{DomainError, Result};
use crate::domain::store::DirectoryStore;
use crate::infrastructure::protocols::sip::{AuthChallenge, SipAuthenticator, SipError};
use chrono::Utc;
use metrics::{counter, gauge};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Unknown authorizing user
    Forbidden,
    /// Credential row points at no extension
    NotFound,
    Timeout,
    NoContext,
}

impl RejectReason {
    /// SIP status a transaction layer would answer with
    pub fn status_code(&self) -> u16 {
        match self {
            RejectReason::Forbidden => 403,
            RejectReason::NotFound => 404,
            RejectReason::Timeout => 408,
            RejectReason::NoContext => 500,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::Forbidden => "forbidden",
            RejectReason::NotFound => "not found",
            RejectReason::Timeout => "timeout",
            RejectReason::NoContext => "no context",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationDecision {
    /// Bindings applied; `contacts` lists the registry's bindings on the
    /// event's context afterwards
    Accept {
        registry: RegistryId,
        expires: u64,
        contacts: Vec<Endpoint>,
    },
    Challenge(AuthChallenge),
    Reject(RejectReason),
}

pub struct RegistrationService {
    directory: Arc<Directory>,
    store: Arc<dyn DirectoryStore>,
    auth: Arc<dyn SipAuthenticator>,
    settings: watch::Receiver<Settings>,
}

impl RegistrationService {
    pub fn new(
        directory: Arc<Directory>,
        store: Arc<dyn DirectoryStore>,
        auth: Arc<dyn SipAuthenticator>,
        settings: watch::Receiver<Settings>,
    ) -> Self {
        Self {
            directory,
            store,
            auth,
            settings,
        }
    }

    /// Lifetime requested for one contact: its own expiry, then the
    /// request's Expires header
    fn requested(contact: &Contact, event: &Event) -> Option<u32> {
        if contact.has_expires() {
            return u32::try_from(contact.expires()).ok();
        }
        event.expires_header().and_then(|v| u32::try_from(v).ok())
    }

    pub async fn handle(&self, event: &Event) -> Result<RegistrationDecision> {
        if event.is_timeout() {
            return Ok(RegistrationDecision::Reject(RejectReason::Timeout));
        }
        let Some(context) = event.context() else {
            return Ok(RegistrationDecision::Reject(RejectReason::NoContext));
        };
        if event.method() != Some(SipMethod::Register) {
            return Err(DomainError::InvalidOperation(format!(
                "{} is not a registration",
                event
            )));
        }

        let (realm, policy) = {
            let settings = self.settings.borrow();
            (settings.realm.clone(), settings.policy)
        };

        let Some(credentials) = event.credentials() else {
            debug!("Challenging unauthenticated {}", event);
            return Ok(RegistrationDecision::Challenge(
                self.auth.create_challenge(&realm).await,
            ));
        };

        let Some(row) = self.store.authorize(&credentials.userid).await? else {
            warn!("Registration from unknown user {}", credentials.userid);
            return Ok(RegistrationDecision::Reject(RejectReason::Forbidden));
        };

        if let Err(e) = self
            .auth
            .verify(credentials, SipMethod::Register.as_str(), &row, &realm)
            .await
        {
            debug!("Digest rejected for {}: {}", credentials.userid, e);
            let mut challenge = self.auth.create_challenge(&realm).await;
            challenge.stale = matches!(e, SipError::StaleNonce);
            return Ok(RegistrationDecision::Challenge(challenge));
        }

        let Some(registry) = row
            .number
            .and_then(|number| self.directory.lookup(&number.to_string()))
        else {
            warn!(
                "User {} authorizes no known extension ({:?})",
                credentials.userid, row.number
            );
            return Ok(RegistrationDecision::Reject(RejectReason::NotFound));
        };
        let id = registry.id();

        let remove_all = event.is_wildcard() || event.expires_header() == Some(0);
        if event.contacts().is_empty() && remove_all {
            let removed = self.directory.remove_endpoints(id, context.id());
            info!("{} unregistered {} binding(s)", registry, removed.len());
            self.record(&credentials.userid).await;
            return Ok(RegistrationDecision::Accept {
                registry: id,
                expires: 0,
                contacts: self.bindings(id, context.id()),
            });
        }

        if event.contacts().is_empty() {
            debug!("Binding query for {}", registry);
            return Ok(RegistrationDecision::Accept {
                registry: id,
                expires: registry.expires(),
                contacts: self.bindings(id, context.id()),
            });
        }

        // contacts sharing an address (all of them, when natted) bind once, for
        // the longest lifetime asked; 0 only when every one of them asked for it
        let mut lifetimes: Vec<(Address, u32)> = Vec::new();
        for contact in event.contacts() {
            let expires = match Self::requested(contact, event) {
                Some(0) => 0,
                requested => policy.clamp(requested),
            };
            match lifetimes.iter_mut().find(|(address, _)| *address == contact.address()) {
                Some((_, longest)) => *longest = (*longest).max(expires),
                None => lifetimes.push((contact.address(), expires)),
            }
        }

        let mut granted = 0u64;
        for (address, expires) in lifetimes {
            if expires == 0 {
                // another account's binding at this address stays
                let owned = self
                    .directory
                    .find_endpoint(context.id(), address)
                    .is_some_and(|ep| ep.registry() == id);
                if owned {
                    self.directory.remove_endpoint(context.id(), address);
                }
            } else if self
                .directory
                .register_endpoint(context.id(), address, expires, id)
                .is_some()
            {
                granted = granted.max(expires as u64);
            }
        }

        self.record(&credentials.userid).await;
        info!(
            "{} registered {} contact(s) for {}s",
            registry,
            event.contacts().len(),
            granted
        );
        Ok(RegistrationDecision::Accept {
            registry: id,
            expires: granted,
            contacts: self.bindings(id, context.id()),
        })
    }

    async fn record(&self, userid: &str) {
        counter!("sip_registrations_total").increment(1);
        gauge!("sip_registered_endpoints").set(self.directory.total_endpoints() as f64);
        if let Err(e) = self.store.touch_authorize(userid, Utc::now()).await {
            warn!("Failed to record registration of {}: {}", userid, e);
        }
    }

    fn bindings(&self, registry: RegistryId, context: ContextId) -> Vec<Endpoint> {
        self.directory
            .registry(registry)
            .map(|r| {
                r.endpoints()
                    .filter(|ep| ep.context() == context)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
