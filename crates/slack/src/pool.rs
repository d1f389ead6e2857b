use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    roomsync_channels::{ExternalConnector, ExternalSession},
    secrecy::Secret,
    tracing::debug,
};

/// Long-lived outbound sessions, one per sink, created on first use.
pub struct SessionPool {
    connector: Arc<dyn ExternalConnector>,
    sessions: Mutex<HashMap<String, Arc<dyn ExternalSession>>>,
}

impl SessionPool {
    pub fn new(connector: Arc<dyn ExternalConnector>) -> Self {
        Self {
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, sink: &str, credential: &Secret<String>) -> Arc<dyn ExternalSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(sessions.entry(sink.to_owned()).or_insert_with(|| {
            debug!(sink, "creating outbound session");
            self.connector.session(credential)
        }))
    }

    /// Drop the sink's session; the next outbound use creates a new one.
    pub fn evict(&self, sink: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(sink)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
