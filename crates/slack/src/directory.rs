use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    async_trait::async_trait,
    roomsync_channels::{DirectorySnapshot, ExternalSession},
    tracing::{debug, warn},
};

/// Resolves Slack ids to display names.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Name of user `id`, or `default` if it stays unknown.
    async fn resolve_user(&self, id: &str, default: &str) -> String;

    /// Name of channel `id`, or `default` if it stays unknown.
    async fn resolve_channel(&self, id: &str, default: &str) -> String;
}

/// One immutable view of the directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryNames {
    users: HashMap<String, String>,
    channels: HashMap<String, String>,
}

impl DirectoryNames {
    pub fn user(&self, id: &str) -> Option<&str> {
        self.users.get(id).map(String::as_str)
    }

    pub fn channel(&self, id: &str) -> Option<&str> {
        self.channels.get(id).map(String::as_str)
    }
}

impl From<DirectorySnapshot> for DirectoryNames {
    fn from(snapshot: DirectorySnapshot) -> Self {
        Self {
            users: snapshot.users.into_iter().map(|e| (e.id, e.name)).collect(),
            channels: snapshot
                .channels
                .into_iter()
                .map(|e| (e.id, e.name))
                .collect(),
        }
    }
}

#[derive(Clone, Copy)]
enum Kind {
    User,
    Channel,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Channel => "channel",
        }
    }

    fn lookup(self, names: &DirectoryNames, id: &str) -> Option<String> {
        match self {
            Self::User => names.user(id),
            Self::Channel => names.channel(id),
        }
        .map(str::to_owned)
    }
}

/// Name cache backed by the session's directory.
///
/// Each refresh swaps in a whole new snapshot; readers clone the `Arc` and
/// never observe a half-updated map.
pub struct DirectoryCache {
    source: Arc<dyn ExternalSession>,
    snapshot: RwLock<Arc<DirectoryNames>>,
}

impl DirectoryCache {
    pub fn new(source: Arc<dyn ExternalSession>, initial: DirectorySnapshot) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(initial.into())),
        }
    }

    pub fn snapshot(&self) -> Arc<DirectoryNames> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Replace the cached directory with a fresh one from the session.
    pub async fn refresh(&self) -> roomsync_channels::Result<()> {
        let fresh = self.source.directory().await?;
        debug!(
            users = fresh.users.len(),
            channels = fresh.channels.len(),
            "directory refreshed"
        );
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(fresh.into());
        Ok(())
    }

    async fn resolve(&self, kind: Kind, id: &str, default: &str) -> String {
        if let Some(name) = kind.lookup(&self.snapshot(), id) {
            return name;
        }
        if let Err(e) = self.refresh().await {
            warn!(kind = kind.as_str(), id, error = %e, "directory refresh failed");
            return default.to_owned();
        }
        kind.lookup(&self.snapshot(), id).unwrap_or_else(|| {
            warn!(kind = kind.as_str(), id, "unknown id after directory refresh");
            default.to_owned()
        })
    }
}

#[async_trait]
impl NameResolver for DirectoryCache {
    async fn resolve_user(&self, id: &str, default: &str) -> String {
        self.resolve(Kind::User, id, default).await
    }

    async fn resolve_channel(&self, id: &str, default: &str) -> String {
        self.resolve(Kind::Channel, id, default).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use roomsync_channels::DirectoryEntry;

    use {
        super::*,
        crate::testing::{FakeSession, capture_logs},
    };

    fn snapshot(users: &[(&str, &str)]) -> DirectorySnapshot {
        DirectorySnapshot {
            users: users
                .iter()
                .map(|(id, name)| DirectoryEntry::new(*id, *name))
                .collect(),
            channels: vec![DirectoryEntry::new("C1", "general")],
        }
    }

    #[tokio::test]
    async fn hit_does_not_refresh() {
        let session = Arc::new(FakeSession::default());
        let cache = DirectoryCache::new(session.clone(), snapshot(&[("U1", "alice")]));

        assert_eq!(cache.resolve_user("U1", "x").await, "alice");
        assert_eq!(cache.resolve_channel("C1", "x").await, "general");
        assert_eq!(session.directory_calls(), 0);
    }

    #[tokio::test]
    async fn miss_refreshes_exactly_once() {
        let session = Arc::new(FakeSession::default());
        session.set_directory(snapshot(&[("U1", "alice"), ("U2", "bob")]));
        let cache = DirectoryCache::new(session.clone(), snapshot(&[("U1", "alice")]));

        assert_eq!(cache.resolve_user("U2", "unknown:U2").await, "bob");
        assert_eq!(session.directory_calls(), 1);

        assert_eq!(cache.resolve_user("U9", "unknown:U9").await, "unknown:U9");
        assert_eq!(session.directory_calls(), 2);
    }

    #[tokio::test]
    async fn miss_after_refresh_logs_warning() {
        let (_guard, logs) = capture_logs();
        let session = Arc::new(FakeSession::default());
        let cache = DirectoryCache::new(session.clone(), snapshot(&[("U1", "alice")]));

        assert_eq!(cache.resolve_user("U1", "x").await, "alice");
        assert!(logs.warnings().is_empty());

        assert_eq!(cache.resolve_user("U9", "unknown:U9").await, "unknown:U9");
        let warnings = logs.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("unknown id after directory refresh"));
        assert!(warnings[0].contains("U9"));
    }

    #[tokio::test]
    async fn refresh_replaces_instead_of_merging() {
        let session = Arc::new(FakeSession::default());
        session.set_directory(snapshot(&[("U2", "bob")]));
        let cache = DirectoryCache::new(session.clone(), snapshot(&[("U1", "alice")]));

        cache.refresh().await.unwrap();
        assert!(cache.snapshot().user("U1").is_none());
        assert_eq!(cache.snapshot().user("U2"), Some("bob"));
    }

    #[tokio::test]
    async fn failed_refresh_yields_default() {
        let session = Arc::new(FakeSession::default());
        session.fail_directory();
        let cache = DirectoryCache::new(session.clone(), DirectorySnapshot::default());

        assert_eq!(cache.resolve_channel("C9", "unknown:C9").await, "unknown:C9");
        assert_eq!(session.directory_calls(), 1);
    }
}
