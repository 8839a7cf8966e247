//! Parsed SIP messages to raw stack events

use super::headers::{is_wildcard, parse_authorization, parse_contacts, parse_user, parse_via};
use super::message::{SipMessage, SipRequest, SipResponse};
use super::rport::stamp_received;
use crate::domain::event::{RawEvent, RawRequest, RawResponse, SipMethod, StackEvent};
use std::net::SocketAddr;

/// Event kind a received request is reported as
pub fn request_kind(method: SipMethod) -> StackEvent {
    match method {
        SipMethod::Invite => StackEvent::CallInvite,
        SipMethod::Ack => StackEvent::CallAck,
        SipMethod::Bye => StackEvent::CallClosed,
        SipMethod::Cancel => StackEvent::CallCancelled,
        SipMethod::Notify => StackEvent::SubscriptionNotify,
        _ => StackEvent::MessageNew,
    }
}

/// Event kind a received response is reported as, by transaction method and status class
pub fn response_kind(method: Option<SipMethod>, status: u16) -> StackEvent {
    use StackEvent::*;

    match method {
        Some(SipMethod::Register) if (200..300).contains(&status) => RegistrationSuccess,
        Some(SipMethod::Register) if status >= 300 => RegistrationFailure,
        Some(SipMethod::Invite) => match status {
            100..=179 => CallProceeding,
            180..=199 => CallRinging,
            200..=299 => CallAnswered,
            300..=399 => CallRedirected,
            400..=499 => CallRequestFailure,
            500..=599 => CallServerFailure,
            _ => CallGlobalFailure,
        },
        Some(SipMethod::Subscribe) => match status {
            100..=199 => SubscriptionProceeding,
            200..=299 => SubscriptionAnswered,
            300..=399 => SubscriptionRedirected,
            400..=499 => SubscriptionRequestFailure,
            500..=599 => SubscriptionServerFailure,
            _ => SubscriptionGlobalFailure,
        },
        Some(SipMethod::Notify) => match status {
            100..=199 => NotificationProceeding,
            200..=299 => NotificationAnswered,
            300..=399 => NotificationRedirected,
            400..=499 => NotificationRequestFailure,
            500..=599 => NotificationServerFailure,
            _ => NotificationGlobalFailure,
        },
        _ => match status {
            100..=199 => MessageProceeding,
            200..=299 => MessageAnswered,
            300..=399 => MessageRedirected,
            400..=499 => MessageRequestFailure,
            500..=599 => MessageServerFailure,
            _ => MessageGlobalFailure,
        },
    }
}

fn adapt_request(request: &SipRequest, source: SocketAddr) -> RawEvent {
    let method = request.method();
    let mut raw = RawRequest::new(method, &request.uri());

    raw.vias = request.vias().iter().flat_map(|v| parse_via(v)).collect();
    stamp_received(&mut raw.vias, source);
    let contacts = request.contacts();
    raw.wildcard = contacts.iter().any(|c| is_wildcard(c));
    raw.contacts = contacts.iter().flat_map(|c| parse_contacts(c)).collect();
    raw.to_user = request.to().as_deref().and_then(parse_user);
    raw.from_user = request.from().as_deref().and_then(parse_user);
    raw.authorization = request.authorization().as_deref().and_then(parse_authorization);
    raw.expires = request.expires();

    RawEvent::request(request_kind(method), raw)
}

fn adapt_response(response: &SipResponse) -> RawEvent {
    let status = response.status_code();
    let raw = RawResponse {
        status,
        contacts: response
            .contacts()
            .iter()
            .flat_map(|c| parse_contacts(c))
            .collect(),
    };
    RawEvent::response(response_kind(response.cseq_method(), status), raw)
}

/// Adapt a message received from `source` into a raw stack event
pub fn adapt(message: &SipMessage, source: SocketAddr) -> RawEvent {
    match message {
        SipMessage::Request(request) => adapt_request(request, source),
        SipMessage::Response(response) => adapt_response(response),
    }
}
