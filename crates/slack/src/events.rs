//! Slack RTM event normalization.

use {roomsync_channels::IncomingEvent, serde_json::Value};

use crate::{Error, Result};

/// Event kinds that only keep the session alive and are dropped silently.
pub const NOOP_KINDS: &[&str] = &["pong", "presence_change", "user_typing"];

/// Session handshake sent first on every new RTM connection.
pub const HANDSHAKE_KIND: &str = "hello";

/// A classified RTM event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtmEvent {
    Hello,
    /// A recognized kind with nothing to relay.
    Noop(String),
    Message(IncomingEvent),
    /// Any kind the relay does not handle.
    Other(String),
}

fn str_field(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_owned)
}

/// Whether a batch starts with the session handshake.
pub fn is_handshake(batch: &[Value]) -> bool {
    batch
        .first()
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        == Some(HANDSHAKE_KIND)
}

/// Classify a raw RTM event. Only a missing `type` is an error; field
/// validation of messages is left to the dispatcher.
pub fn classify(value: &Value) -> Result<RtmEvent> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed("event has no type"))?;

    if kind == HANDSHAKE_KIND {
        return Ok(RtmEvent::Hello);
    }
    if NOOP_KINDS.contains(&kind) {
        return Ok(RtmEvent::Noop(kind.to_owned()));
    }
    if kind != "message" {
        return Ok(RtmEvent::Other(kind.to_owned()));
    }

    let subtype = value.get("subtype").and_then(Value::as_str);
    let mut event = IncomingEvent {
        kind: kind.to_owned(),
        ..Default::default()
    };

    match subtype {
        Some("message_changed") => {
            event.edited = true;
            event.text = str_field(value, "/message/text");
            event.sender_id = str_field(value, "/message/edited/user");
        },
        Some("bot_message") if value.get("user").is_none() => {
            event.is_bot_origin = true;
            event.text = str_field(value, "/text");
            event.sender_display_name = str_field(value, "/username");
        },
        _ => {
            event.text = str_field(value, "/text");
            event.sender_id = str_field(value, "/user");
        },
    }

    if let Some(channel) = str_field(value, "/channel") {
        event.room_id = Some(channel);
    } else if let Some(group) = str_field(value, "/group") {
        event.room_id = Some(group);
        event.is_private = true;
    }

    Ok(RtmEvent::Message(event))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {rstest::rstest, serde_json::json};

    use super::*;

    fn message(value: Value) -> IncomingEvent {
        match classify(&value).unwrap() {
            RtmEvent::Message(event) => event,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[rstest]
    #[case("pong")]
    #[case("presence_change")]
    #[case("user_typing")]
    fn noop_kinds(#[case] kind: &str) {
        assert_eq!(
            classify(&json!({ "type": kind })).unwrap(),
            RtmEvent::Noop(kind.into())
        );
    }

    #[test]
    fn missing_type_is_malformed() {
        let err = classify(&json!({ "text": "hi" })).unwrap_err();
        assert!(matches!(err, Error::MalformedEvent { .. }));
    }

    #[test]
    fn other_kinds_are_passed_through() {
        assert_eq!(
            classify(&json!({ "type": "channel_joined" })).unwrap(),
            RtmEvent::Other("channel_joined".into())
        );
        assert_eq!(classify(&json!({ "type": "hello" })).unwrap(), RtmEvent::Hello);
    }

    #[test]
    fn plain_message() {
        let event = message(json!({
            "type": "message", "user": "U1", "text": "hi", "channel": "C1"
        }));
        assert_eq!(event.sender_id.as_deref(), Some("U1"));
        assert_eq!(event.text.as_deref(), Some("hi"));
        assert_eq!(event.room_id.as_deref(), Some("C1"));
        assert!(!event.is_private && !event.is_bot_origin && !event.edited);
    }

    #[test]
    fn edited_message_reads_nested_fields() {
        let event = message(json!({
            "type": "message",
            "subtype": "message_changed",
            "channel": "C1",
            "message": { "text": "fixed", "edited": { "user": "U2" } }
        }));
        assert!(event.edited);
        assert_eq!(event.text.as_deref(), Some("fixed"));
        assert_eq!(event.sender_id.as_deref(), Some("U2"));
    }

    #[test]
    fn bot_message_without_user() {
        let event = message(json!({
            "type": "message",
            "subtype": "bot_message",
            "username": "Ann (via HO:Team)",
            "text": "hello",
            "group": "G1"
        }));
        assert!(event.is_bot_origin);
        assert!(event.is_private);
        assert_eq!(event.room_id.as_deref(), Some("G1"));
        assert_eq!(event.sender_display_name.as_deref(), Some("Ann (via HO:Team)"));
        assert_eq!(event.sender_id, None);
    }

    #[test]
    fn bot_message_with_user_is_a_normal_message() {
        let event = message(json!({
            "type": "message", "subtype": "bot_message", "user": "U3", "text": "x"
        }));
        assert!(!event.is_bot_origin);
        assert_eq!(event.sender_id.as_deref(), Some("U3"));
        assert_eq!(event.room_id, None);
    }

    #[test]
    fn handshake_detection_looks_at_first_event_only() {
        assert!(is_handshake(&[json!({ "type": "hello" }), json!({ "type": "message" })]));
        assert!(!is_handshake(&[json!({ "type": "message" }), json!({ "type": "hello" })]));
        assert!(!is_handshake(&[]));
    }
}
