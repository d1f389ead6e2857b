//! Origin tags that keep relayed content from bouncing back.
//!
//! Outbound messages carry their origin room name, either in the posted
//! username (`Ann (via HO:Team)`) or in the italic room name at the end of
//! a membership notice. Inbound events are checked for the same tags.

use roomsync_channels::{IncomingEvent, MembershipChange, OutgoingMembershipEvent};

const TAG_OPEN: &str = " (via HO:";

/// Sender name for a host message relayed out of room `room`.
pub fn tag_sender(full_name: &str, room: &str) -> String {
    format!("{full_name}{TAG_OPEN}{room})")
}

/// Notice text for a host membership change in room `room`.
pub fn membership_text(event: &OutgoingMembershipEvent, room: &str) -> String {
    let names = event
        .affected_user_links
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    match event.change {
        MembershipChange::Join => {
            let actor = event
                .actor_link
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            format!("{actor} has added {names} to _{room}_")
        },
        MembershipChange::Leave => format!("{names} has left _{room}_"),
    }
}

/// Origin room from a tagged sender name such as `Ann (via HO:Team)`.
pub fn origin_from_sender_name(name: &str) -> Option<&str> {
    if name.contains('\n') {
        return None;
    }
    let body = name.strip_suffix(')')?;
    // The last tag wins, unless it carries no room name.
    body.rmatch_indices(TAG_OPEN)
        .map(|(at, _)| &body[at + TAG_OPEN.len()..])
        .find(|room| !room.is_empty())
}

/// Origin room from a membership notice posted by the bridge itself.
pub fn origin_from_membership_text(text: &str) -> Option<&str> {
    if text.contains('\n') {
        return None;
    }
    let body = text.strip_suffix('_')?;
    let candidates = || {
        body.rmatch_indices('_')
            .map(|(at, _)| (&body[..at], &body[at + 1..]))
            .filter(|(_, room)| !room.is_empty())
    };

    let added = candidates().find(|(prefix, _)| {
        prefix
            .strip_suffix(" to ")
            .is_some_and(|head| head.contains(" has added "))
    });
    added
        .or_else(|| candidates().find(|(prefix, _)| prefix.ends_with(" has left ")))
        .map(|(_, room)| room)
}

/// What the loop guard learned about an inbound event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    /// Room name the content was relayed out of, if it carries a tag.
    pub room: Option<String>,
    /// Display name carried by the event itself; when set, no directory
    /// lookup is needed.
    pub username: Option<String>,
}

/// Inspects inbound events for origin tags.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    self_id: String,
}

impl LoopGuard {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
        }
    }

    pub fn inspect(&self, event: &IncomingEvent) -> Origin {
        if event.is_bot_origin {
            let name = event.sender_display_name.clone().unwrap_or_default();
            return Origin {
                room: origin_from_sender_name(&name).map(str::to_owned),
                username: Some(name),
            };
        }
        let from_self = event.sender_id.as_deref() == Some(self.self_id.as_str());
        let room = from_self
            .then(|| event.text.as_deref().and_then(origin_from_membership_text))
            .flatten()
            .map(str::to_owned);
        Origin {
            room,
            username: None,
        }
    }

    /// Whether content with `origin` may be delivered to room `destination`.
    pub fn allows(origin: &Origin, destination: &str) -> bool {
        origin.room.as_deref() != Some(destination)
    }
}
