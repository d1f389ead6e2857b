use std::sync::Arc;

use {async_trait::async_trait, secrecy::Secret, serde::Serialize};

use crate::Result;

/// One known user or channel of the external platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub id: String,
    pub name: String,
}

impl DirectoryEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The external platform's current users and channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectorySnapshot {
    pub users: Vec<DirectoryEntry>,
    pub channels: Vec<DirectoryEntry>,
}

/// What a successful session establishment yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// The bridge's own user id on the external platform.
    pub self_id: String,
    pub directory: DirectorySnapshot,
}

/// A message to post on the external platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub channel_id: String,
    pub text: String,
    /// Displayed sender name; ignored when `as_user` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Post as the bridge's own identity instead of a custom username.
    pub as_user: bool,
}

/// One authenticated session with the external platform.
#[async_trait]
pub trait ExternalSession: Send + Sync {
    /// Establish the realtime session and return the initial directory.
    async fn connect(&self) -> Result<SessionInfo>;

    /// Drain events received since the last call. Never waits for new
    /// events; an empty batch is normal.
    async fn poll_events(&self) -> Result<Vec<serde_json::Value>>;

    async fn post_message(&self, message: &OutgoingMessage) -> Result<()>;

    /// Send a keepalive probe over the realtime session.
    async fn send_ping(&self) -> Result<()>;

    /// Fetch a fresh directory snapshot.
    async fn directory(&self) -> Result<DirectorySnapshot>;
}

/// Builds sessions from credentials. Construction must not touch the
/// network; connecting happens in [`ExternalSession::connect`].
pub trait ExternalConnector: Send + Sync {
    fn session(&self, credential: &Secret<String>) -> Arc<dyn ExternalSession>;
}
