//! In-memory host and Slack fakes for tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    roomsync_channels::{
        DirectorySnapshot, Error, ExternalConnector, ExternalSession, HostClient,
        HostConversation, HostUser, OutgoingMessage, Result, SessionInfo,
    },
    secrecy::{ExposeSecret, Secret},
    serde_json::Value,
};

#[derive(Default)]
pub(crate) struct FakeSession {
    batches: Mutex<VecDeque<Vec<Value>>>,
    close_when_drained: AtomicBool,
    connect_failures: AtomicUsize,
    reject_credential: AtomicBool,
    hang_connect: AtomicBool,
    connect_calls: AtomicUsize,
    pings: AtomicUsize,
    posted: Mutex<Vec<OutgoingMessage>>,
    failing_channels: Mutex<HashSet<String>>,
    directory: Mutex<DirectorySnapshot>,
    directory_calls: AtomicUsize,
    fail_directory: AtomicBool,
}

impl FakeSession {
    pub fn push_batch(&self, batch: Vec<Value>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    /// Polls fail once every queued batch was handed out.
    pub fn close_when_drained(&self) {
        self.close_when_drained.store(true, Ordering::SeqCst);
    }

    /// The next `n` connects fail with a transient error.
    pub fn fail_connects(&self, n: usize) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    pub fn reject_credential(&self) {
        self.reject_credential.store(true, Ordering::SeqCst);
    }

    /// Connects never complete.
    pub fn hang_connect(&self) {
        self.hang_connect.store(true, Ordering::SeqCst);
    }

    pub fn fail_post_to(&self, channel_id: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_owned());
    }

    pub fn set_directory(&self, snapshot: DirectorySnapshot) {
        *self.directory.lock().unwrap() = snapshot;
    }

    pub fn fail_directory(&self) {
        self.fail_directory.store(true, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn directory_calls(&self) -> usize {
        self.directory_calls.load(Ordering::SeqCst)
    }

    pub fn posted(&self) -> Vec<OutgoingMessage> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalSession for FakeSession {
    async fn connect(&self) -> Result<SessionInfo> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reject_credential.load(Ordering::SeqCst) {
            return Err(crate::Error::api("rtm.connect", "invalid_auth").into());
        }
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::unavailable("connection refused"));
        }
        Ok(SessionInfo {
            self_id: "UBOT".into(),
            directory: self.directory.lock().unwrap().clone(),
        })
    }

    async fn poll_events(&self) -> Result<Vec<Value>> {
        match self.batches.lock().unwrap().pop_front() {
            Some(batch) => Ok(batch),
            None if self.close_when_drained.load(Ordering::SeqCst) => {
                Err(Error::unavailable("rtm connection closed"))
            },
            None => Ok(Vec::new()),
        }
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<()> {
        if self
            .failing_channels
            .lock()
            .unwrap()
            .contains(&message.channel_id)
        {
            return Err(Error::delivery(&message.channel_id, "channel_not_found"));
        }
        self.posted.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn send_ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn directory(&self) -> Result<DirectorySnapshot> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_directory.load(Ordering::SeqCst) {
            return Err(Error::unavailable("users.list timed out"));
        }
        Ok(self.directory.lock().unwrap().clone())
    }
}

/// Hands out one [`FakeSession`] per credential.
#[derive(Default)]
pub(crate) struct FakeConnector {
    sessions: Mutex<HashMap<String, Arc<FakeSession>>>,
    created: AtomicUsize,
}

impl FakeConnector {
    pub fn insert(&self, credential: &str, session: Arc<FakeSession>) {
        self.sessions
            .lock()
            .unwrap()
            .insert(credential.to_owned(), session);
    }

    /// The session for `credential`, created if needed.
    pub fn session_for(&self, credential: &str) -> Arc<FakeSession> {
        Arc::clone(
            self.sessions
                .lock()
                .unwrap()
                .entry(credential.to_owned())
                .or_default(),
        )
    }

    /// Number of `session` calls so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ExternalConnector for FakeConnector {
    fn session(&self, credential: &Secret<String>) -> Arc<dyn ExternalSession> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.session_for(credential.expose_secret())
    }
}

#[derive(Default)]
pub(crate) struct FakeHost {
    conversations: Vec<HostConversation>,
    list_calls: AtomicUsize,
    accept_direct: AtomicBool,
    directs: Mutex<Vec<(String, String)>>,
    broadcasts: Mutex<Vec<(String, String)>>,
    failing_conversations: Mutex<HashSet<String>>,
    avatars: Mutex<HashMap<String, String>>,
    avatar_lookups: AtomicUsize,
    users: Mutex<HashMap<String, HostUser>>,
    user_lookups: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn with_conversations(conversations: &[(&str, &str)]) -> Self {
        Self {
            conversations: conversations
                .iter()
                .map(|(id, name)| HostConversation {
                    id: (*id).into(),
                    display_name: (*name).into(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn accept_direct(&self) {
        self.accept_direct.store(true, Ordering::SeqCst);
    }

    pub fn fail_broadcast_to(&self, conversation_id: &str) {
        self.failing_conversations
            .lock()
            .unwrap()
            .insert(conversation_id.to_owned());
    }

    pub fn set_avatar(&self, user_id: &str, url: &str) {
        self.avatars
            .lock()
            .unwrap()
            .insert(user_id.to_owned(), url.to_owned());
    }

    pub fn add_user(&self, user: HostUser) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn avatar_lookups(&self) -> usize {
        self.avatar_lookups.load(Ordering::SeqCst)
    }

    /// Ids passed to `lookup_user`, in call order.
    pub fn user_lookups(&self) -> Vec<String> {
        self.user_lookups.lock().unwrap().clone()
    }

    pub fn directs(&self) -> Vec<(String, String)> {
        self.directs.lock().unwrap().clone()
    }

    pub fn broadcasts(&self) -> Vec<(String, String)> {
        self.broadcasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostClient for FakeHost {
    async fn list_conversations(&self) -> Result<Vec<HostConversation>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.conversations.clone())
    }

    async fn send_direct_message(&self, conversation_id: &str, rich_text: &str) -> Result<bool> {
        if !self.accept_direct.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.directs
            .lock()
            .unwrap()
            .push((conversation_id.to_owned(), rich_text.to_owned()));
        Ok(true)
    }

    async fn send_to_conversation(&self, conversation_id: &str, rich_text: &str) -> Result<()> {
        if self
            .failing_conversations
            .lock()
            .unwrap()
            .contains(conversation_id)
        {
            return Err(Error::delivery(conversation_id, "conversation not found"));
        }
        self.broadcasts
            .lock()
            .unwrap()
            .push((conversation_id.to_owned(), rich_text.to_owned()));
        Ok(())
    }

    async fn lookup_avatar_url(&self, user_id: &str) -> Option<String> {
        self.avatar_lookups.fetch_add(1, Ordering::SeqCst);
        self.avatars.lock().unwrap().get(user_id).cloned()
    }

    async fn lookup_user(&self, user_id: &str) -> Option<HostUser> {
        self.user_lookups.lock().unwrap().push(user_id.to_owned());
        self.users.lock().unwrap().get(user_id).cloned()
    }
}

/// Log lines recorded while the guard from [`capture_logs`] is alive.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Lines logged at WARN level.
    pub fn warnings(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains("WARN"))
            .map(str::to_owned)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's tracing events into a buffer until the guard drops.
pub(crate) fn capture_logs() -> (tracing::subscriber::DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (tracing::subscriber::set_default(subscriber), logs)
}
