//! UDP transport context
//!
//! Receives datagrams, parses them with rsip and hands normalized events to
//! the core over a bounded channel. This context never answers requests.

use super::adapter::adapt;
use super::message::{SipError, SipMessage};
use crate::domain::context::{Context, ContextRef, TransportProtocol};
use crate::domain::event::Event;
use crate::domain::shared::value_objects::ContextId;
use bytes::BytesMut;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default depth of the event queue between a context and the core
pub const EVENT_QUEUE_DEPTH: usize = 1000;

const MAX_DATAGRAM: usize = 65535;

/// UDP context implementation
pub struct UdpContext {
    id: ContextId,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    transactions: AtomicI32,
    hostnames: RwLock<Vec<String>>,
}

impl UdpContext {
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self, SipError> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| SipError::TransportError(format!("Failed to bind UDP socket: {}", e)))?;
        let local_addr = socket.local_addr()?;
        info!("UDP context listening on {}", local_addr);

        Ok(Self {
            id: ContextId::new(),
            socket: Arc::new(socket),
            local_addr,
            transactions: AtomicI32::new(0),
            hostnames: RwLock::new(Vec::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Names (aliases, local names, hostname) this context answers to
    pub fn set_hostnames(&self, names: Vec<String>) {
        debug!("UDP context {} hostnames: {:?}", self.local_addr, names);
        *self.hostnames.write() = names;
    }

    pub fn is_local_name(&self, host: &str) -> bool {
        self.hostnames
            .read()
            .iter()
            .any(|name| name.eq_ignore_ascii_case(host))
    }

    /// Turn one datagram into an event; unparseable data yields `None`
    pub fn handle_datagram(&self, data: &[u8], source: SocketAddr) -> Option<Event> {
        let message = match SipMessage::parse(data) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse SIP message from {}: {}", source, e);
                return None;
            }
        };

        let transaction = self.transactions.fetch_add(1, Ordering::Relaxed) + 1;
        let raw = adapt(&message, source).with_ids(0, 0, transaction);
        let event = Event::new(Some(&raw), self.context_ref());
        debug!("{} from {}", event, source);
        Some(event)
    }

    /// Run the receive loop until the socket fails or the core goes away
    pub fn spawn(self: Arc<Self>, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.receive_loop(tx).await;
        })
    }

    async fn receive_loop(&self, tx: mpsc::Sender<Event>) {
        let mut buf = BytesMut::zeroed(MAX_DATAGRAM);

        loop {
            match self.socket.recv_from(&mut buf[..]).await {
                Ok((size, source)) => {
                    debug!("Received {} bytes from {} via UDP", size, source);

                    let Some(event) = self.handle_datagram(&buf[..size], source) else {
                        continue;
                    };
                    if let Err(e) = tx.send(event).await {
                        error!("Failed to send event to core: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to receive UDP packet: {}", e);
                    break;
                }
            }
        }
        info!("UDP context {} stopped", self.local_addr);
    }
}

impl Context for UdpContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn protocol(&self) -> TransportProtocol {
        TransportProtocol::Udp
    }
}

impl std::fmt::Debug for UdpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpContext")
            .field("id", &self.id)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
