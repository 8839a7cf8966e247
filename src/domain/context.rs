//! Transport context boundary
//!
//! A context is a transport-specific multiplexer (one UDP socket, one TLS
//! listener, ...) that feeds raw events into the core and asks the directory
//! where things are. The core never owns a context; events and endpoints
//! refer to one through a [`ContextRef`].

use super::directory::{Directory, Endpoint, Registry};
use super::shared::value_objects::{Address, ContextId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "udp",
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Tls => "tls",
            TransportProtocol::Ws => "ws",
            TransportProtocol::Wss => "wss",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            TransportProtocol::Udp => 5060,
            TransportProtocol::Tcp => 5060,
            TransportProtocol::Tls => 5061,
            TransportProtocol::Ws => 80,
            TransportProtocol::Wss => 443,
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-owning handle to a context, carried by events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextRef {
    id: ContextId,
    protocol: TransportProtocol,
}

impl ContextRef {
    pub fn new(id: ContextId, protocol: TransportProtocol) -> Self {
        Self { id, protocol }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }
}

/// Transport context as seen from the core
pub trait Context: Send + Sync {
    fn id(&self) -> ContextId;

    fn protocol(&self) -> TransportProtocol;

    /// Protocol name of this context ("udp", "tls", ...)
    fn type_name(&self) -> &'static str {
        self.protocol().as_str()
    }

    fn context_ref(&self) -> ContextRef {
        ContextRef::new(self.id(), self.protocol())
    }

    fn find_endpoint(&self, directory: &Directory, address: Address) -> Option<Endpoint> {
        directory.find_endpoint(self.id(), address)
    }

    fn lookup(&self, directory: &Directory, target: &str) -> Option<Registry> {
        directory.lookup(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Loopback(ContextId);

    impl Context for Loopback {
        fn id(&self) -> ContextId {
            self.0
        }

        fn protocol(&self) -> TransportProtocol {
            TransportProtocol::Tls
        }
    }

    #[test]
    fn test_context_defaults() {
        let id = ContextId::new();
        let ctx = Loopback(id);
        assert_eq!(ctx.type_name(), "tls");
        assert_eq!(ctx.context_ref(), ContextRef::new(id, TransportProtocol::Tls));
        assert_eq!(TransportProtocol::Tls.default_port(), 5061);

        let directory = Directory::new();
        let addr = Address::parse("10.0.0.1", 5060).unwrap();
        assert!(ctx.find_endpoint(&directory, addr).is_none());
        assert!(ctx.lookup(&directory, "100").is_none());
    }
}
