//! Immutable domain event built from a raw stack event

use super::category::{EventCategory, StackEvent};
use super::raw::{AuthorizationHeader, ContactHeader, RawEvent, RawMessage, SipMethod, ViaHeader};
use crate::domain::context::ContextRef;
use crate::domain::shared::value_objects::{Address, Contact, DEFAULT_SIP_PORT};
use std::fmt;
use tracing::debug;

/// Strip one pair of matching double or single quotes
pub fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_port(port: Option<&str>) -> Option<u16> {
    port.map(str::trim)
        .filter(|p| !p.is_empty())
        .and_then(|p| p.parse::<u16>().ok())
}

/// Digest credentials carried by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub userid: String,
    pub digest: String,
    pub nonce: Option<String>,
    pub realm: Option<String>,
    pub algorithm: Option<String>,
    pub uri: Option<String>,
}

impl Credentials {
    /// Only headers with both a username and a response are verifiable
    fn from_header(header: &AuthorizationHeader) -> Option<Self> {
        let unquoted = |value: &Option<String>| {
            value
                .as_deref()
                .map(unquote)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Some(Self {
            userid: unquoted(&header.username)?,
            digest: unquoted(&header.response)?,
            nonce: unquoted(&header.nonce),
            realm: unquoted(&header.realm),
            algorithm: unquoted(&header.algorithm),
            uri: unquoted(&header.uri),
        })
    }
}

/// Event handed to the registration and routing logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    context: Option<ContextRef>,
    kind: Option<StackEvent>,
    call_id: i32,
    dialog_id: i32,
    transaction_id: i32,
    method: Option<SipMethod>,
    request_uri: Option<String>,
    target: Option<String>,
    source: Option<Address>,
    natted: bool,
    hops: u32,
    contacts: Vec<Contact>,
    wildcard: bool,
    expires: i32,
    expires_header: Option<i32>,
    status: u16,
    credentials: Option<Credentials>,
}

impl Default for Event {
    fn default() -> Self {
        Self::timeout()
    }
}

impl Event {
    /// Empty, context-less event used as the timeout marker
    pub fn timeout() -> Self {
        Self {
            context: None,
            kind: None,
            call_id: 0,
            dialog_id: 0,
            transaction_id: 0,
            method: None,
            request_uri: None,
            target: None,
            source: None,
            natted: false,
            hops: 0,
            contacts: Vec::new(),
            wildcard: false,
            expires: Contact::UNSPECIFIED,
            expires_header: None,
            status: 0,
            credentials: None,
        }
    }

    /// Build an event from a raw stack event; `None` yields the timeout marker
    pub fn new(raw: Option<&RawEvent>, context: ContextRef) -> Self {
        let mut event = Self::timeout();
        let Some(raw) = raw else {
            return event;
        };

        event.context = Some(context);
        event.kind = Some(raw.kind);
        event.call_id = raw.call_id;
        event.dialog_id = raw.dialog_id;
        event.transaction_id = raw.transaction_id;

        match &raw.message {
            RawMessage::Response(response) => {
                event.status = response.status;
            }
            RawMessage::Request(request) => {
                event.method = Some(request.method);
                event.request_uri = Some(request.uri.clone());
                event.target = request.to_user.as_deref().map(unquote).map(str::to_string);
                event.credentials = request
                    .authorization
                    .as_ref()
                    .and_then(Credentials::from_header);
                event.expires_header = request
                    .expires
                    .as_deref()
                    .and_then(|v| v.trim().parse::<i32>().ok())
                    .filter(|v| *v >= 0);
                event.parse_source(&request.vias);
                event.parse_contacts(&request.contacts);
                event.wildcard = request.wildcard;
            }
            RawMessage::Empty => {}
        }

        event
    }

    // Effective source of the request, or the address of its NAT
    fn parse_source(&mut self, vias: &[ViaHeader]) {
        let mut nat: Option<Address> = None;
        let mut topmost = true;

        for via in vias {
            self.hops += 1;
            let Some(host) = via.host.as_deref() else {
                continue;
            };
            let port = parse_port(via.port.as_deref()).unwrap_or(DEFAULT_SIP_PORT);

            if topmost {
                topmost = false;
                self.source = Address::parse(host, port);
            }

            // first NAT signal only
            if nat.is_none() {
                let rport = via
                    .param("rport")
                    .flatten()
                    .and_then(|v| parse_port(Some(v)))
                    .filter(|p| *p != 0);
                if let Some(rport) = rport {
                    nat = via
                        .param("received")
                        .flatten()
                        .and_then(|received| Address::parse(received, rport));
                }
            }
        }

        if let Some(nat) = nat {
            self.natted = true;
            self.source = Some(nat);
        }
    }

    fn parse_contacts(&mut self, contacts: &[ContactHeader]) {
        for header in contacts {
            let Some(host) = header.host.as_deref() else {
                continue;
            };
            let expires = header
                .param("expires")
                .flatten()
                .and_then(|v| v.trim().parse::<i32>().ok())
                .filter(|v| *v >= 0)
                .unwrap_or(Contact::UNSPECIFIED);

            // a natted request is natted for every contact it carries
            let address = if self.natted {
                self.source
            } else {
                let port = parse_port(header.port.as_deref()).unwrap_or(DEFAULT_SIP_PORT);
                Address::parse(host, port)
            };

            let Some(address) = address else {
                debug!("Skipping contact with unresolvable host {}", host);
                continue;
            };

            if expires > self.expires {
                self.expires = expires;
            }
            self.contacts
                .push(Contact::new(address, expires, header.user.clone()));
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.context.is_none()
    }

    pub fn context(&self) -> Option<ContextRef> {
        self.context
    }

    /// Protocol name of the owning context, `None` for the timeout marker
    pub fn protocol(&self) -> Option<&'static str> {
        self.context.map(|ctx| ctx.protocol().as_str())
    }

    pub fn kind(&self) -> Option<StackEvent> {
        self.kind
    }

    pub fn category(&self) -> EventCategory {
        EventCategory::classify(self.kind)
    }

    pub fn call_id(&self) -> i32 {
        self.call_id
    }

    pub fn dialog_id(&self) -> i32 {
        self.dialog_id
    }

    pub fn transaction_id(&self) -> i32 {
        self.transaction_id
    }

    pub fn method(&self) -> Option<SipMethod> {
        self.method
    }

    pub fn request_uri(&self) -> Option<&str> {
        self.request_uri.as_deref()
    }

    /// User part of the To header
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn source(&self) -> Option<Address> {
        self.source
    }

    pub fn is_natted(&self) -> bool {
        self.natted
    }

    pub fn hops(&self) -> u32 {
        self.hops
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Request asked to remove every binding (`Contact: *`)
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// The contact of a single-contact event
    pub fn contact(&self) -> Option<&Contact> {
        match self.contacts.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Longest expiry across contacts, `-1` when none was given
    pub fn expires(&self) -> i32 {
        self.expires
    }

    /// Request-level `Expires:` header
    pub fn expires_header(&self) -> Option<i32> {
        self.expires_header
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn userid(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.userid.as_str())
    }

    pub fn digest(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.digest.as_str())
    }

    pub fn nonce(&self) -> Option<&str> {
        self.credentials.as_ref().and_then(|c| c.nonce.as_deref())
    }

    pub fn realm(&self) -> Option<&str> {
        self.credentials.as_ref().and_then(|c| c.realm.as_deref())
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.credentials.as_ref().and_then(|c| c.algorithm.as_deref())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.context) {
            (Some(kind), Some(ctx)) => write!(
                f,
                "Event({}/{},cid={},did={},proto={})",
                kind.code(),
                kind.category(),
                self.call_id,
                self.dialog_id,
                ctx.protocol()
            ),
            _ => write!(f, "Event(timeout)"),
        }
    }
}
