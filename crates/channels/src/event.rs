use serde::Serialize;

use crate::host::MembershipChange;

/// A normalized event received from the external platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncomingEvent {
    /// Platform type tag, e.g. `message`.
    pub kind: String,
    /// The message is an edit of an earlier one.
    pub edited: bool,
    pub sender_id: Option<String>,
    /// Sender name carried by the event itself (automated posts only).
    pub sender_display_name: Option<String>,
    pub text: Option<String>,
    pub room_id: Option<String>,
    pub is_private: bool,
    /// Posted by an integration rather than a user account.
    pub is_bot_origin: bool,
}

/// A host message prepared for relaying to the external platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessageEvent {
    pub sender_full_name: String,
    pub host_conversation_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A link to a host user, rendered in external-platform link syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserLink {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    pub full_name: String,
}

impl std::fmt::Display for UserLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.profile_url {
            Some(url) => write!(f, "<{url}|{}>", self.full_name),
            None => f.write_str(&self.full_name),
        }
    }
}

/// A host membership change prepared for relaying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMembershipEvent {
    pub host_conversation_id: String,
    pub change: MembershipChange,
    pub affected_user_links: Vec<UserLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_link: Option<UserLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_link_renders_profile_url() {
        let link = UserLink {
            profile_url: Some("https://example.com/u/1".into()),
            full_name: "Ann Lee".into(),
        };
        assert_eq!(link.to_string(), "<https://example.com/u/1|Ann Lee>");
    }

    #[test]
    fn user_link_without_url_is_plain_name() {
        let link = UserLink {
            profile_url: None,
            full_name: "Ann Lee".into(),
        };
        assert_eq!(link.to_string(), "Ann Lee");
    }
}
