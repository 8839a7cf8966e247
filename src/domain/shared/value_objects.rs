//! Shared value objects used across multiple bounded contexts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

/// Port assumed when a Via or Contact omits one
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// Call identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport context identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network address of a SIP peer (IP host + port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(SocketAddr);

impl Address {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(host, port))
    }

    /// Parse a textual host (IP literal, IPv6 may be bracketed) with a port.
    ///
    /// Hostnames are not resolved here; they yield `None`.
    pub fn parse(host: &str, port: u16) -> Option<Self> {
        let host = host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        host.parse::<IpAddr>().ok().map(|ip| Self::new(ip, port))
    }

    pub fn host(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One resolved `Contact:` entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    address: Address,
    expires: i32,
    user: Option<String>,
}

impl Contact {
    /// Expiry value for a contact that carried no `expires` parameter
    pub const UNSPECIFIED: i32 = -1;

    pub fn new(address: Address, expires: i32, user: Option<String>) -> Self {
        Self {
            address,
            expires,
            user,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Requested lifetime in seconds, `-1` when unspecified
    pub fn expires(&self) -> i32 {
        self.expires
    }

    pub fn has_expires(&self) -> bool {
        self.expires >= 0
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "sip:{}@{}", user, self.address)?,
            None => write!(f, "sip:{}", self.address)?,
        }
        if self.has_expires() {
            write!(f, ";expires={}", self.expires)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse() {
        let addr = Address::parse("192.168.1.100", 5062).unwrap();
        assert_eq!(addr.host().to_string(), "192.168.1.100");
        assert_eq!(addr.port(), 5062);

        let v6 = Address::parse("[2001:db8::1]", DEFAULT_SIP_PORT).unwrap();
        assert_eq!(v6.host().to_string(), "2001:db8::1");

        assert!(Address::parse("pbx.example.com", 5060).is_none());
    }

    #[test]
    fn test_address_equality() {
        let a = Address::parse("10.0.0.4", 5060).unwrap();
        let b: Address = "10.0.0.4:5060".parse::<SocketAddr>().unwrap().into();
        let c = Address::parse("10.0.0.4", 5061).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_contact_display() {
        let addr = Address::parse("10.0.0.4", 5060).unwrap();
        let contact = Contact::new(addr, 120, Some("bob".to_string()));
        assert_eq!(contact.to_string(), "sip:bob@10.0.0.4:5060;expires=120");

        let bare = Contact::new(addr, Contact::UNSPECIFIED, None);
        assert!(!bare.has_expires());
        assert_eq!(bare.to_string(), "sip:10.0.0.4:5060");
    }
}
