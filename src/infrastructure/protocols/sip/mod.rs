//! SIP protocol boundary
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────┐
//! │   UdpContext (socket)   │
//! └───────────┬─────────────┘
//!             │ datagrams
//! ┌───────────▼─────────────┐
//! │   rsip parse, adapter   │
//! │ (headers, rport stamp)  │
//! └───────────┬─────────────┘
//!             │ RawEvent → Event
//! ┌───────────▼─────────────┐
//! │   Registration core     │
//! └─────────────────────────┘
//! ```

pub mod adapter;
pub mod auth;
pub mod context;
pub mod headers;
pub mod message;
pub mod rport;

pub use adapter::adapt;
pub use auth::{AuthChallenge, DigestAlgorithm, DigestAuth, SipAuthenticator, NONCE_LIFETIME};
pub use context::{UdpContext, EVENT_QUEUE_DEPTH};
pub use message::{SipError, SipMessage, SipRequest, SipResponse};
