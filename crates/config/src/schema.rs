/// Config schema types (relay loop tuning, reconnect policy, sinks).
use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsyncConfig {
    pub relay: RelayConfig,
    /// One entry per bridge. The legacy plugin config key `slackrtm` is
    /// accepted as an alias.
    #[serde(alias = "slackrtm")]
    pub sinks: Vec<SinkConfig>,
}

/// Loop tuning shared by every sink worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Delay between two poll loop iterations (ms).
    pub poll_interval_ms: u64,

    /// Minimum spacing between keepalive probes (seconds).
    pub keepalive_interval_secs: u64,

    /// Base URL of the Slack Web API.
    pub api_base_url: String,

    /// Marker appended to the username of edited messages.
    pub edit_marker: String,

    /// What a worker does after losing its session.
    pub reconnect: ReconnectPolicy,
}

impl RelayConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            keepalive_interval_secs: 3,
            api_base_url: "https://slack.com/api".into(),
            edit_marker: "(msgupd)".into(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Reconnection policy for a worker whose session failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// The worker terminates on the first session failure.
    #[default]
    Never,
    /// Exponential backoff, capped at `max_delay_ms`.
    Backoff {
        #[serde(default = "default_initial_delay_ms")]
        initial_delay_ms: u64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
        /// `None` retries forever.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_attempts: Option<u32>,
    },
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (zero-based), or
    /// `None` when the worker should give up.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::Backoff {
                initial_delay_ms,
                max_delay_ms,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    return None;
                }
                let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
                let delay = initial_delay_ms.saturating_mul(factor).min(*max_delay_ms);
                Some(Duration::from_millis(delay))
            },
        }
    }
}

/// Configuration for one bridge: a Slack credential plus its room mappings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name used in logs and as the session pool key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Slack API token.
    #[serde(alias = "credentialKey", alias = "key", serialize_with = "serialize_secret")]
    pub credential_key: Secret<String>,

    /// Channel/conversation pairs kept in sync.
    #[serde(default, alias = "syncedRooms", alias = "synced_conversations")]
    pub synced_rooms: Vec<SyncedRoom>,
}

impl SinkConfig {
    /// Configured name, or `sink-<index>` when none is set.
    #[must_use]
    pub fn display_name(&self, index: usize) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("sink-{index}"))
    }
}

impl std::fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConfig")
            .field("name", &self.name)
            .field("credential_key", &"[REDACTED]")
            .field("synced_rooms", &self.synced_rooms)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// One room mapping, written as `[channel, conversation]` or
/// `[channel, conversation, display_name]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SyncedRoom {
    pub channel_id: String,
    pub conversation_id: String,
    pub display_name: Option<String>,
}

impl TryFrom<Vec<String>> for SyncedRoom {
    type Error = String;

    fn try_from(parts: Vec<String>) -> Result<Self, Self::Error> {
        let len = parts.len();
        let mut parts = parts.into_iter();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(channel_id), Some(conversation_id), display_name, None) => Ok(Self {
                channel_id,
                conversation_id,
                display_name,
            }),
            _ => Err(format!(
                "synced room entry must have 2 or 3 elements, got {len}"
            )),
        }
    }
}

impl From<SyncedRoom> for Vec<String> {
    fn from(room: SyncedRoom) -> Self {
        let mut parts = vec![room.channel_id, room.conversation_id];
        parts.extend(room.display_name);
        parts
    }
}
