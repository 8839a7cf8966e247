//! Raw events as delivered by the protocol stack
//!
//! These are already tokenized header fields. Values are kept exactly as the
//! stack produced them (quotes included); all interpretation happens when an
//! [`Event`](super::Event) is built.

use super::category::StackEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SIP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SipMethod {
    Register,
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
    Info,
    Update,
    Prack,
    Subscribe,
    Notify,
    Refer,
    Message,
    Publish,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Register => "REGISTER",
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
            SipMethod::Info => "INFO",
            SipMethod::Update => "UPDATE",
            SipMethod::Prack => "PRACK",
            SipMethod::Subscribe => "SUBSCRIBE",
            SipMethod::Notify => "NOTIFY",
            SipMethod::Refer => "REFER",
            SipMethod::Message => "MESSAGE",
            SipMethod::Publish => "PUBLISH",
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generic `name[=value]` header parameter
pub type Param = (String, Option<String>);

fn find_param<'a>(params: &'a [Param], name: &str) -> Option<Option<&'a str>> {
    params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_deref())
}

/// One hop of a Via header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViaHeader {
    pub transport: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub params: Vec<Param>,
}

impl ViaHeader {
    pub fn new(host: &str, port: Option<u16>) -> Self {
        Self {
            transport: None,
            host: Some(host.to_string()),
            port: port.map(|p| p.to_string()),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: Option<&str>) -> Self {
        self.params
            .push((name.to_string(), value.map(|v| v.to_string())));
        self
    }

    /// `None` if absent, `Some(None)` for a flag parameter such as bare `rport`
    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        find_param(&self.params, name)
    }
}

/// One entry of a Contact header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactHeader {
    pub display: Option<String>,
    pub scheme: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub params: Vec<Param>,
}

impl ContactHeader {
    pub fn new(user: Option<&str>, host: &str, port: Option<u16>) -> Self {
        Self {
            display: None,
            scheme: Some("sip".to_string()),
            user: user.map(|u| u.to_string()),
            host: Some(host.to_string()),
            port: port.map(|p| p.to_string()),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: Option<&str>) -> Self {
        self.params
            .push((name.to_string(), value.map(|v| v.to_string())));
        self
    }

    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        find_param(&self.params, name)
    }
}

/// Digest fields of an Authorization / Proxy-Authorization header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationHeader {
    pub scheme: Option<String>,
    pub username: Option<String>,
    pub realm: Option<String>,
    pub nonce: Option<String>,
    pub uri: Option<String>,
    pub response: Option<String>,
    pub algorithm: Option<String>,
}

/// Tokenized request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub method: SipMethod,
    pub uri: String,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub vias: Vec<ViaHeader>,
    pub contacts: Vec<ContactHeader>,
    /// `Contact: *` was present
    pub wildcard: bool,
    pub authorization: Option<AuthorizationHeader>,
    pub expires: Option<String>,
}

impl RawRequest {
    pub fn new(method: SipMethod, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            from_user: None,
            to_user: None,
            vias: Vec::new(),
            contacts: Vec::new(),
            wildcard: false,
            authorization: None,
            expires: None,
        }
    }
}

/// Tokenized response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub contacts: Vec<ContactHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    Request(RawRequest),
    Response(RawResponse),
    /// Stack notification without an attached message
    Empty,
}

/// Raw event handed over by a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: StackEvent,
    pub call_id: i32,
    pub dialog_id: i32,
    pub transaction_id: i32,
    pub message: RawMessage,
}

impl RawEvent {
    pub fn request(kind: StackEvent, request: RawRequest) -> Self {
        Self {
            kind,
            call_id: 0,
            dialog_id: 0,
            transaction_id: 0,
            message: RawMessage::Request(request),
        }
    }

    pub fn response(kind: StackEvent, response: RawResponse) -> Self {
        Self {
            kind,
            call_id: 0,
            dialog_id: 0,
            transaction_id: 0,
            message: RawMessage::Response(response),
        }
    }

    pub fn with_ids(mut self, call_id: i32, dialog_id: i32, transaction_id: i32) -> Self {
        self.call_id = call_id;
        self.dialog_id = dialog_id;
        self.transaction_id = transaction_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_via_params() {
        let via = ViaHeader::new("203.0.113.5", None)
            .with_param("branch", Some("z9hG4bK776asdhds"))
            .with_param("rport", None)
            .with_param("Received", Some("198.51.100.9"));

        assert_eq!(via.param("rport"), Some(None));
        assert_eq!(via.param("received"), Some(Some("198.51.100.9")));
        assert_eq!(via.param("maddr"), None);
    }

    #[test]
    fn test_method_display() {
        assert_eq!(SipMethod::Register.to_string(), "REGISTER");
        assert_eq!(SipMethod::Notify.as_str(), "NOTIFY");
    }
}
