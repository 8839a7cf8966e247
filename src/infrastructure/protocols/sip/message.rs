//! SIP message wrappers over rsip

use crate::domain::event::SipMethod;
use rsip::{Header, Headers, Method, Request, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The nonce was issued here but is past its lifetime
    #[error("Stale nonce")]
    StaleNonce,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for SipError {
    fn from(err: std::io::Error) -> Self {
        SipError::TransportError(err.to_string())
    }
}

pub fn method_from_rsip(method: &Method) -> SipMethod {
    match method {
        Method::Register => SipMethod::Register,
        Method::Invite => SipMethod::Invite,
        Method::Ack => SipMethod::Ack,
        Method::Cancel => SipMethod::Cancel,
        Method::Bye => SipMethod::Bye,
        Method::Options => SipMethod::Options,
        Method::Info => SipMethod::Info,
        Method::Update => SipMethod::Update,
        Method::PRack => SipMethod::Prack,
        Method::Subscribe => SipMethod::Subscribe,
        Method::Notify => SipMethod::Notify,
        Method::Refer => SipMethod::Refer,
        Method::Message => SipMethod::Message,
        Method::Publish => SipMethod::Publish,
    }
}

// rsip may render typed headers with their name ("Via: ..."); keep the value only
fn strip_name(rendered: String, name: &str) -> String {
    match rendered.split_once(':') {
        Some((prefix, value)) if prefix.trim().eq_ignore_ascii_case(name) => {
            value.trim().to_string()
        }
        _ => rendered.trim().to_string(),
    }
}

/// Values of every header selected by `select`, in message order
fn header_values<F>(headers: &Headers, select: F) -> Vec<String>
where
    F: Fn(&Header) -> Option<(&'static str, String)>,
{
    headers
        .iter()
        .filter_map(|h| select(h))
        .map(|(name, rendered)| strip_name(rendered, name))
        .collect()
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> SipMethod {
        method_from_rsip(&self.inner.method)
    }

    pub fn uri(&self) -> String {
        self.inner.uri.to_string()
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn vias(&self) -> Vec<String> {
        header_values(&self.inner.headers, |h| match h {
            Header::Via(via) => Some(("Via", via.to_string())),
            _ => None,
        })
    }

    pub fn contacts(&self) -> Vec<String> {
        header_values(&self.inner.headers, |h| match h {
            Header::Contact(contact) => Some(("Contact", contact.to_string())),
            _ => None,
        })
    }

    pub fn to(&self) -> Option<String> {
        header_values(&self.inner.headers, |h| match h {
            Header::To(to) => Some(("To", to.to_string())),
            _ => None,
        })
        .into_iter()
        .next()
    }

    pub fn from(&self) -> Option<String> {
        header_values(&self.inner.headers, |h| match h {
            Header::From(from) => Some(("From", from.to_string())),
            _ => None,
        })
        .into_iter()
        .next()
    }

    pub fn expires(&self) -> Option<String> {
        header_values(&self.inner.headers, |h| match h {
            Header::Expires(expires) => Some(("Expires", expires.to_string())),
            _ => None,
        })
        .into_iter()
        .next()
    }

    /// Authorization, falling back to Proxy-Authorization
    pub fn authorization(&self) -> Option<String> {
        header_values(&self.inner.headers, |h| match h {
            Header::Authorization(auth) => Some(("Authorization", auth.to_string())),
            Header::ProxyAuthorization(auth) => Some(("Proxy-Authorization", auth.to_string())),
            _ => None,
        })
        .into_iter()
        .next()
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;
        Ok(Self::new(response))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    /// Method named by the CSeq header
    pub fn cseq_method(&self) -> Option<SipMethod> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::CSeq(cseq) => cseq.method().ok().map(|m| method_from_rsip(&m)),
            _ => None,
        })
    }

    pub fn contacts(&self) -> Vec<String> {
        header_values(&self.inner.headers, |h| match h {
            Header::Contact(contact) => Some(("Contact", contact.to_string())),
            _ => None,
        })
    }
}

/// SIP Message (either request or response)
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        // Try parsing as request first
        if let Ok(request) = SipRequest::parse(data) {
            return Ok(SipMessage::Request(request));
        }

        if let Ok(response) = SipResponse::parse(data) {
            return Ok(SipMessage::Response(response));
        }

        Err(SipError::ParseError(
            "Could not parse as SIP request or response".to_string(),
        ))
    }

    pub fn is_request(&self) -> bool {
        matches!(self, SipMessage::Request(_))
    }

    pub fn as_request(&self) -> Option<&SipRequest> {
        match self {
            SipMessage::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&SipResponse> {
        match self {
            SipMessage::Response(resp) => Some(resp),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register_request() {
        let data = b"REGISTER sip:registrar.example.com SIP/2.0\r\n\
                     Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds;rport\r\n\
                     From: Alice <sip:1001@example.com>;tag=1928301774\r\n\
                     To: Alice <sip:1001@example.com>\r\n\
                     Call-ID: a84b4c76e66710@pc33.example.com\r\n\
                     CSeq: 314159 REGISTER\r\n\
                     Contact: <sip:1001@192.168.1.100:5060>;expires=60\r\n\
                     Expires: 3600\r\n\
                     Content-Length: 0\r\n\r\n";

        let msg = SipMessage::parse(data).unwrap();
        assert!(msg.is_request());

        let req = msg.as_request().unwrap();
        assert_eq!(req.method(), SipMethod::Register);
        assert_eq!(req.vias().len(), 1);
        assert!(req.vias()[0].starts_with("SIP/2.0/UDP 192.168.1.100:5060"));
        assert_eq!(req.contacts().len(), 1);
        assert!(req.contacts()[0].contains("expires=60"));
        assert_eq!(req.expires().as_deref(), Some("3600"));
        assert!(req.to().unwrap().contains("sip:1001@example.com"));
        assert!(req.authorization().is_none());
    }

    #[test]
    fn test_parse_response() {
        let data = b"SIP/2.0 180 Ringing\r\n\
                     Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds\r\n\
                     From: Alice <sip:alice@example.com>;tag=1928301774\r\n\
                     To: Bob <sip:bob@example.com>;tag=a6c85cf\r\n\
                     Call-ID: a84b4c76e66710@pc33.example.com\r\n\
                     CSeq: 1 INVITE\r\n\
                     Content-Length: 0\r\n\r\n";

        let msg = SipMessage::parse(data).unwrap();
        let resp = msg.as_response().unwrap();
        assert_eq!(resp.status_code(), 180);
        assert_eq!(resp.cseq_method(), Some(SipMethod::Invite));
    }

    #[test]
    fn test_strip_header_name() {
        assert_eq!(strip_name("Expires: 3600".to_string(), "Expires"), "3600");
        assert_eq!(strip_name("3600".to_string(), "Expires"), "3600");
        assert_eq!(
            strip_name("sip:alice@10.0.0.4".to_string(), "Contact"),
            "sip:alice@10.0.0.4"
        );
        assert_eq!(
            strip_name("Contact: <sip:alice@10.0.0.4>".to_string(), "Contact"),
            "<sip:alice@10.0.0.4>"
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            SipMessage::parse(b"hello world"),
            Err(SipError::ParseError(_))
        ));
    }
}
