use std::collections::HashMap;

use tracing::{debug, warn};

use {
    roomsync_channels::{HostClient, HostConversation},
    roomsync_config::SinkConfig,
};

use crate::Result;

/// One side of a room mapping: the id on the other platform plus the
/// display name shared by both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomLink {
    pub id: String,
    pub name: String,
}

impl RoomLink {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Bidirectional channel ↔ conversation mapping for one sink.
///
/// Built once when a worker starts and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct SinkRegistry {
    hosts_for_channel: HashMap<String, Vec<RoomLink>>,
    channels_for_conversation: HashMap<String, Vec<RoomLink>>,
}

impl SinkRegistry {
    /// Build the registry, resolving missing display names through the
    /// host's conversation list.
    pub async fn build(sink: &str, config: &SinkConfig, host: &dyn HostClient) -> Result<Self> {
        let needs_lookup = config.synced_rooms.iter().any(|r| r.display_name.is_none());
        let conversations = if needs_lookup {
            host.list_conversations().await?
        } else {
            Vec::new()
        };
        Ok(Self::from_conversations(sink, config, &conversations))
    }

    /// Build the registry from an already fetched conversation list.
    pub fn from_conversations(
        sink: &str,
        config: &SinkConfig,
        conversations: &[HostConversation],
    ) -> Self {
        let names: HashMap<&str, &str> = conversations
            .iter()
            .map(|c| (c.id.as_str(), c.display_name.as_str()))
            .collect();

        let mut registry = Self::default();
        for room in &config.synced_rooms {
            let name = match (&room.display_name, names.get(room.conversation_id.as_str())) {
                (Some(explicit), _) => explicit.clone(),
                (None, Some(found)) => (*found).to_string(),
                (None, None) => {
                    warn!(
                        sink,
                        conversation_id = %room.conversation_id,
                        "could not find conversation in host conversation list, using its id as display name"
                    );
                    room.conversation_id.clone()
                },
            };
            debug!(
                sink,
                channel_id = %room.channel_id,
                conversation_id = %room.conversation_id,
                name = %name,
                "registered room mapping"
            );
            registry
                .hosts_for_channel
                .entry(room.channel_id.clone())
                .or_default()
                .push(RoomLink::new(&room.conversation_id, &name));
            registry
                .channels_for_conversation
                .entry(room.conversation_id.clone())
                .or_default()
                .push(RoomLink::new(&room.channel_id, name));
        }
        registry
    }

    /// Host conversations mapped to an external channel.
    pub fn hosts(&self, channel_id: &str) -> &[RoomLink] {
        self.hosts_for_channel
            .get(channel_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// External channels mapped to a host conversation.
    pub fn channels(&self, conversation_id: &str) -> &[RoomLink] {
        self.channels_for_conversation
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts_for_channel.is_empty()
    }
}
