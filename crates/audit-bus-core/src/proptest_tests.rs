//! Property-based tests for the event model.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use crate::event::{Action, AuditEvent, Status};
use crate::message::AuditMessage;
use crate::validation::Validate;

fn action_strategy() -> impl Strategy<Value = Action> {
    prop::sample::select(Action::ALL.to_vec())
}

fn status_strategy() -> impl Strategy<Value = Status> {
    prop_oneof![Just(Status::Success), Just(Status::Error)]
}

fn event_strategy() -> impl Strategy<Value = AuditEvent> {
    (
        "[a-z]{1,12}",
        prop::option::of(any::<i64>()),
        action_strategy(),
        "[A-Za-z0-9 :]{0,40}[A-Za-z0-9]",
        status_strategy(),
        prop::option::of(0i64..4_102_444_800),
    )
        .prop_map(|(entity_type, entity_id, action, details, status, secs)| {
            let mut event = AuditEvent::new(entity_type, entity_id, action, details, status);
            if let Some(secs) = secs {
                event = event.with_timestamp(Utc.timestamp_opt(secs, 0).unwrap());
            }
            event
        })
}

proptest! {
    /// A well-formed event survives the queue unchanged apart from the
    /// added service and defaulted timestamp.
    #[test]
    fn decoded_envelope_matches_event(event in event_strategy(), service in "[a-z-]{1,20}") {
        let now = Utc.with_ymd_and_hms(2025, 5, 5, 5, 5, 5).unwrap();
        let message = AuditMessage::from_event_at(&event, &service, now);
        let decoded = AuditMessage::from_json(&message.to_json().unwrap()).unwrap();

        prop_assert_eq!(&decoded, &message);
        prop_assert_eq!(&decoded.service, &service);
        prop_assert_eq!(decoded.timestamp, event.timestamp.unwrap_or(now));

        let mut round_tripped = decoded.to_event();
        if event.timestamp.is_none() {
            round_tripped.timestamp = None;
        }
        prop_assert_eq!(round_tripped, event);
    }

    /// Any whitespace-only details string is rejected.
    #[test]
    fn blank_details_never_validate(blank in "[ \t]{0,8}") {
        let event = AuditEvent::success("cliente", Some(1), Action::Read, blank);
        prop_assert!(!event.is_valid());
    }

    /// Arbitrary bytes never panic the decoder.
    #[test]
    fn decoder_never_panics(body in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = AuditMessage::from_json(&body);
    }
}
