//! Stack event kinds and their diagnostic categories

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event kinds reported by the protocol stack
///
/// Numbering follows the stack's own event table so logged codes line up
/// with its traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackEvent {
    RegistrationSuccess,
    RegistrationFailure,
    CallInvite,
    CallReinvite,
    CallNoAnswer,
    CallProceeding,
    CallRinging,
    CallAnswered,
    CallRedirected,
    CallRequestFailure,
    CallServerFailure,
    CallGlobalFailure,
    CallAck,
    CallCancelled,
    CallMessageNew,
    CallMessageProceeding,
    CallMessageAnswered,
    CallMessageRedirected,
    CallMessageRequestFailure,
    CallMessageServerFailure,
    CallMessageGlobalFailure,
    CallClosed,
    CallReleased,
    MessageNew,
    MessageProceeding,
    MessageAnswered,
    MessageRedirected,
    MessageRequestFailure,
    MessageServerFailure,
    MessageGlobalFailure,
    SubscriptionNoAnswer,
    SubscriptionProceeding,
    SubscriptionAnswered,
    SubscriptionRedirected,
    SubscriptionRequestFailure,
    SubscriptionServerFailure,
    SubscriptionGlobalFailure,
    SubscriptionNotify,
    InSubscriptionNew,
    NotificationNoAnswer,
    NotificationProceeding,
    NotificationAnswered,
    NotificationRedirected,
    NotificationRequestFailure,
    NotificationServerFailure,
    NotificationGlobalFailure,
    /// A code this crate does not know about
    Other(u16),
}

const KNOWN: [StackEvent; 46] = [
    StackEvent::RegistrationSuccess,
    StackEvent::RegistrationFailure,
    StackEvent::CallInvite,
    StackEvent::CallReinvite,
    StackEvent::CallNoAnswer,
    StackEvent::CallProceeding,
    StackEvent::CallRinging,
    StackEvent::CallAnswered,
    StackEvent::CallRedirected,
    StackEvent::CallRequestFailure,
    StackEvent::CallServerFailure,
    StackEvent::CallGlobalFailure,
    StackEvent::CallAck,
    StackEvent::CallCancelled,
    StackEvent::CallMessageNew,
    StackEvent::CallMessageProceeding,
    StackEvent::CallMessageAnswered,
    StackEvent::CallMessageRedirected,
    StackEvent::CallMessageRequestFailure,
    StackEvent::CallMessageServerFailure,
    StackEvent::CallMessageGlobalFailure,
    StackEvent::CallClosed,
    StackEvent::CallReleased,
    StackEvent::MessageNew,
    StackEvent::MessageProceeding,
    StackEvent::MessageAnswered,
    StackEvent::MessageRedirected,
    StackEvent::MessageRequestFailure,
    StackEvent::MessageServerFailure,
    StackEvent::MessageGlobalFailure,
    StackEvent::SubscriptionNoAnswer,
    StackEvent::SubscriptionProceeding,
    StackEvent::SubscriptionAnswered,
    StackEvent::SubscriptionRedirected,
    StackEvent::SubscriptionRequestFailure,
    StackEvent::SubscriptionServerFailure,
    StackEvent::SubscriptionGlobalFailure,
    StackEvent::SubscriptionNotify,
    StackEvent::InSubscriptionNew,
    StackEvent::NotificationNoAnswer,
    StackEvent::NotificationProceeding,
    StackEvent::NotificationAnswered,
    StackEvent::NotificationRedirected,
    StackEvent::NotificationRequestFailure,
    StackEvent::NotificationServerFailure,
    StackEvent::NotificationGlobalFailure,
];

impl StackEvent {
    pub fn from_code(code: u16) -> Self {
        KNOWN
            .get(code as usize)
            .copied()
            .unwrap_or(StackEvent::Other(code))
    }

    pub fn code(&self) -> u16 {
        match self {
            StackEvent::Other(code) => *code,
            known => KNOWN
                .iter()
                .position(|k| k == known)
                .map(|pos| pos as u16)
                .unwrap_or(u16::MAX),
        }
    }

    pub fn category(&self) -> EventCategory {
        use StackEvent::*;
        match self {
            RegistrationSuccess => EventCategory::Register,
            CallInvite => EventCategory::Invite,
            CallReinvite => EventCategory::Reinvite,
            CallNoAnswer | SubscriptionNoAnswer | NotificationNoAnswer => EventCategory::NoAnswer,
            MessageProceeding
            | NotificationProceeding
            | CallMessageProceeding
            | SubscriptionProceeding
            | CallProceeding => EventCategory::Proceed,
            CallRinging => EventCategory::Ring,
            MessageAnswered
            | CallAnswered
            | CallMessageAnswered
            | SubscriptionAnswered
            | NotificationAnswered => EventCategory::Answer,
            SubscriptionRedirected
            | NotificationRedirected
            | CallMessageRedirected
            | CallRedirected
            | MessageRedirected => EventCategory::Redirect,
            RegistrationFailure => EventCategory::NoReg,
            SubscriptionRequestFailure
            | NotificationRequestFailure
            | CallRequestFailure
            | CallMessageRequestFailure
            | MessageRequestFailure => EventCategory::Failed,
            SubscriptionServerFailure
            | NotificationServerFailure
            | CallServerFailure
            | CallMessageServerFailure
            | MessageServerFailure => EventCategory::Server,
            SubscriptionGlobalFailure
            | NotificationGlobalFailure
            | CallGlobalFailure
            | CallMessageGlobalFailure
            | MessageGlobalFailure => EventCategory::Global,
            CallAck => EventCategory::Ack,
            CallClosed | CallReleased => EventCategory::Bye,
            CallCancelled => EventCategory::Cancel,
            MessageNew | CallMessageNew | InSubscriptionNew => EventCategory::New,
            SubscriptionNotify => EventCategory::Notify,
            Other(_) => EventCategory::Unknown,
        }
    }
}

/// Short category used in logs and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Register,
    Invite,
    Reinvite,
    NoAnswer,
    Proceed,
    Ring,
    Answer,
    Redirect,
    NoReg,
    Failed,
    Server,
    Global,
    Ack,
    Bye,
    Cancel,
    New,
    Notify,
    Unknown,
    /// No underlying stack event, i.e. a timeout marker
    None,
}

impl EventCategory {
    /// Classify an optional stack event; `None` is the timeout marker
    pub fn classify(kind: Option<StackEvent>) -> Self {
        kind.map(|k| k.category()).unwrap_or(EventCategory::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Register => "register",
            EventCategory::Invite => "invite",
            EventCategory::Reinvite => "reinvite",
            EventCategory::NoAnswer => "noanswer",
            EventCategory::Proceed => "proceed",
            EventCategory::Ring => "ring",
            EventCategory::Answer => "answer",
            EventCategory::Redirect => "redirect",
            EventCategory::NoReg => "noreg",
            EventCategory::Failed => "failed",
            EventCategory::Server => "server",
            EventCategory::Global => "global",
            EventCategory::Ack => "ack",
            EventCategory::Bye => "bye",
            EventCategory::Cancel => "cancel",
            EventCategory::New => "new",
            EventCategory::Notify => "notify",
            EventCategory::Unknown => "unknown",
            EventCategory::None => "none",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip_for_known_events() {
        for (pos, kind) in KNOWN.iter().enumerate() {
            assert_eq!(kind.code() as usize, pos);
            assert_eq!(StackEvent::from_code(pos as u16), *kind);
        }
        assert_eq!(StackEvent::from_code(46), StackEvent::Other(46));
        assert_eq!(StackEvent::Other(99).code(), 99);
    }

    #[test]
    fn test_classification() {
        assert_eq!(StackEvent::RegistrationSuccess.category().as_str(), "register");
        assert_eq!(StackEvent::RegistrationFailure.category().as_str(), "noreg");
        assert_eq!(StackEvent::CallRinging.category().as_str(), "ring");
        assert_eq!(StackEvent::CallReleased.category().as_str(), "bye");
        assert_eq!(StackEvent::NotificationGlobalFailure.category().as_str(), "global");
        assert_eq!(StackEvent::InSubscriptionNew.category().as_str(), "new");
        assert_eq!(StackEvent::SubscriptionNotify.category().as_str(), "notify");
        assert_eq!(StackEvent::CallMessageServerFailure.category().as_str(), "server");
        assert_eq!(StackEvent::Other(77).category(), EventCategory::Unknown);
    }

    #[test]
    fn test_absent_event_is_none() {
        assert_eq!(EventCategory::classify(None).as_str(), "none");
        assert_eq!(
            EventCategory::classify(Some(StackEvent::CallAck)),
            EventCategory::Ack
        );
    }
}
