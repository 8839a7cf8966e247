//! Event model
//!
//! Turns a raw, already tokenized stack event into an immutable [`Event`]:
//! effective source address (with NAT correction), contacts, expiry and
//! digest credentials. Building an event never touches the directory.

pub mod category;
pub mod model;
pub mod raw;

pub use category::{EventCategory, StackEvent};
pub use model::{unquote, Credentials, Event};
pub use raw::{
    AuthorizationHeader, ContactHeader, Param, RawEvent, RawMessage, RawRequest, RawResponse,
    SipMethod, ViaHeader,
};
