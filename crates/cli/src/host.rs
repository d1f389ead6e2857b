//! Console stand-in for the host chat platform.

use std::{collections::BTreeMap, sync::Arc};

use {
    async_trait::async_trait,
    roomsync_channels::{
        HostClient, HostConversation, HostMembershipEvent, HostMessageEvent, HostUser,
        MembershipChange, Result,
    },
    roomsync_config::RoomsyncConfig,
    roomsync_slack::SinkHub,
    tokio::io::{AsyncBufReadExt, BufReader},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

/// Host that knows conversations from the config and logs deliveries.
pub struct ConsoleHost {
    conversations: Vec<HostConversation>,
}

impl ConsoleHost {
    /// Conversations named explicitly in any sink's synced rooms.
    pub fn from_config(config: &RoomsyncConfig) -> Self {
        let mut named = BTreeMap::new();
        for room in config.sinks.iter().flat_map(|s| &s.synced_rooms) {
            if let Some(name) = &room.display_name {
                named
                    .entry(room.conversation_id.clone())
                    .or_insert_with(|| name.clone());
            }
        }
        Self {
            conversations: named
                .into_iter()
                .map(|(id, display_name)| HostConversation { id, display_name })
                .collect(),
        }
    }
}

#[async_trait]
impl HostClient for ConsoleHost {
    async fn list_conversations(&self) -> Result<Vec<HostConversation>> {
        Ok(self.conversations.clone())
    }

    async fn send_direct_message(&self, _conversation_id: &str, _rich_text: &str) -> Result<bool> {
        Ok(false)
    }

    async fn send_to_conversation(&self, conversation_id: &str, rich_text: &str) -> Result<()> {
        info!(conversation_id, text = rich_text, "host delivery");
        Ok(())
    }

    async fn lookup_avatar_url(&self, _user_id: &str) -> Option<String> {
        None
    }

    async fn lookup_user(&self, user_id: &str) -> Option<HostUser> {
        Some(HostUser {
            id: user_id.to_owned(),
            full_name: user_id.to_owned(),
            profile_url: None,
        })
    }
}

/// One line typed on the console.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Message(HostMessageEvent),
    Membership(HostMembershipEvent),
}

/// Parse `<conversation> <text>`, `/join <conversation> <user>...` or
/// `/leave <conversation> <user>...`.
pub fn parse_line(line: &str, sender: &str) -> Option<ConsoleCommand> {
    let line = line.trim();
    let membership = |rest: &str, change| {
        let mut parts = rest.split_whitespace();
        let conversation_id = parts.next()?.to_owned();
        let participant_ids: Vec<String> = parts.map(str::to_owned).collect();
        if participant_ids.is_empty() {
            return None;
        }
        Some(ConsoleCommand::Membership(HostMembershipEvent {
            conversation_id,
            change,
            participant_ids,
            actor_id: sender.to_owned(),
        }))
    };

    if let Some(rest) = line.strip_prefix("/join ") {
        return membership(rest, MembershipChange::Join);
    }
    if let Some(rest) = line.strip_prefix("/leave ") {
        return membership(rest, MembershipChange::Leave);
    }
    let (conversation_id, text) = line.split_once(char::is_whitespace)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(ConsoleCommand::Message(HostMessageEvent {
        sender_id: sender.to_owned(),
        sender_full_name: sender.to_owned(),
        conversation_id: conversation_id.to_owned(),
        text: text.to_owned(),
    }))
}

/// Relay console lines through the hub until stdin closes or `cancel`
/// fires.
pub async fn read_console(hub: Arc<SinkHub>, sender: String, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read console input");
                break;
            },
        };
        let report = match parse_line(&line, &sender) {
            Some(ConsoleCommand::Message(event)) => hub.handle_outgoing(&event).await,
            Some(ConsoleCommand::Membership(event)) => hub.handle_membership(&event).await,
            None => {
                warn!("expected `<conversation> <text>` or `/join|/leave <conversation> <user>...`");
                continue;
            },
        };
        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "console line relayed"
        );
    }
}
