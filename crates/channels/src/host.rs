use {async_trait::async_trait, serde::Serialize};

use crate::Result;

/// A conversation the host platform knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostConversation {
    pub id: String,
    pub display_name: String,
}

/// A host platform user, as needed to build profile links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostUser {
    pub id: String,
    pub full_name: String,
    /// Public profile page, if the host exposes one.
    pub profile_url: Option<String>,
}

/// A message posted in a host conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostMessageEvent {
    pub sender_id: String,
    pub sender_full_name: String,
    pub conversation_id: String,
    pub text: String,
}

/// Kind of membership change in a host conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipChange {
    Join,
    Leave,
}

/// Participants joined or left a host conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostMembershipEvent {
    pub conversation_id: String,
    pub change: MembershipChange,
    pub participant_ids: Vec<String>,
    /// The user who performed the change (the inviter for joins).
    pub actor_id: String,
}

/// The host chat platform, as seen by the relay.
///
/// Listing, user lookup and delivery belong to the host; the relay only
/// consumes them through this trait.
#[async_trait]
pub trait HostClient: Send + Sync {
    /// All conversations the bridge account participates in.
    async fn list_conversations(&self) -> Result<Vec<HostConversation>>;

    /// Deliver rich text "directly" to a conversation.
    ///
    /// Returns `Ok(false)` when the direct path is not available, in which
    /// case callers fall back to [`HostClient::send_to_conversation`].
    async fn send_direct_message(&self, conversation_id: &str, rich_text: &str) -> Result<bool>;

    /// Broadcast rich text to every member of a conversation.
    async fn send_to_conversation(&self, conversation_id: &str, rich_text: &str) -> Result<()>;

    /// Avatar URL for a user. Best effort: `None` never blocks delivery.
    async fn lookup_avatar_url(&self, user_id: &str) -> Option<String>;

    /// Profile information for a user, if known.
    async fn lookup_user(&self, user_id: &str) -> Option<HostUser>;
}
