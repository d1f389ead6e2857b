use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    roomsync_channels::{
        ExternalConnector, HostClient, HostMembershipEvent, HostMessageEvent, MembershipChange,
        OutgoingMembershipEvent, OutgoingMessageEvent, UserLink,
    },
    secrecy::Secret,
    tracing::{debug, info},
};

use crate::{
    dispatcher::{RelayDispatcher, RelayReport},
    pool::SessionPool,
};

struct RegisteredSink {
    credential: Secret<String>,
    dispatcher: Arc<RelayDispatcher>,
}

/// Routes host events to every running sink.
///
/// Workers register their dispatcher once connected and deregister when
/// their session ends. Outbound posts go through a pooled session per sink.
pub struct SinkHub {
    host: Arc<dyn HostClient>,
    pool: SessionPool,
    sinks: RwLock<HashMap<String, RegisteredSink>>,
}

impl SinkHub {
    pub fn new(host: Arc<dyn HostClient>, connector: Arc<dyn ExternalConnector>) -> Self {
        Self {
            host,
            pool: SessionPool::new(connector),
            sinks: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, credential: Secret<String>, dispatcher: Arc<RelayDispatcher>) {
        let sink = dispatcher.sink().to_owned();
        info!(sink = %sink, "sink registered");
        self.sinks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(sink, RegisteredSink {
                credential,
                dispatcher,
            });
    }

    /// Remove a sink and drop its pooled session.
    pub fn deregister(&self, sink: &str) {
        let removed = self
            .sinks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(sink)
            .is_some();
        self.pool.evict(sink);
        if removed {
            info!(sink, "sink deregistered");
        }
    }

    pub fn sink_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .sinks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Registered sinks with at least one channel mapped to `conversation_id`.
    fn targets(&self, conversation_id: &str) -> Vec<(String, Secret<String>, Arc<RelayDispatcher>)> {
        let sinks = self.sinks.read().unwrap_or_else(|e| e.into_inner());
        let mut targets: Vec<_> = sinks
            .iter()
            .filter(|(_, s)| !s.dispatcher.registry().channels(conversation_id).is_empty())
            .map(|(name, s)| (name.clone(), s.credential.clone(), Arc::clone(&s.dispatcher)))
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));
        targets
    }

    /// Relay a host message to all sinks that sync its conversation.
    pub async fn handle_outgoing(&self, event: &HostMessageEvent) -> RelayReport {
        let targets = self.targets(&event.conversation_id);
        if targets.is_empty() {
            debug!(conversation_id = %event.conversation_id, "no sink syncs this conversation");
            return RelayReport::default();
        }

        let outgoing = OutgoingMessageEvent {
            sender_full_name: event.sender_full_name.clone(),
            host_conversation_id: event.conversation_id.clone(),
            text: event.text.clone(),
            avatar_url: self.host.lookup_avatar_url(&event.sender_id).await,
        };

        let mut report = RelayReport::default();
        for (sink, credential, dispatcher) in targets {
            let session = self.pool.get_or_create(&sink, &credential);
            report += dispatcher.handle_outgoing(&outgoing, session.as_ref()).await;
        }
        report
    }

    /// Relay a host membership change to all sinks that sync its
    /// conversation.
    pub async fn handle_membership(&self, event: &HostMembershipEvent) -> RelayReport {
        let targets = self.targets(&event.conversation_id);
        if targets.is_empty() {
            return RelayReport::default();
        }

        let mut affected_user_links = Vec::with_capacity(event.participant_ids.len());
        for id in &event.participant_ids {
            affected_user_links.push(self.user_link(id).await);
        }
        let actor_link = match event.change {
            MembershipChange::Join => Some(self.user_link(&event.actor_id).await),
            MembershipChange::Leave => None,
        };
        let outgoing = OutgoingMembershipEvent {
            host_conversation_id: event.conversation_id.clone(),
            change: event.change,
            affected_user_links,
            actor_link,
        };

        let mut report = RelayReport::default();
        for (sink, credential, dispatcher) in targets {
            let session = self.pool.get_or_create(&sink, &credential);
            report += dispatcher.handle_membership(&outgoing, session.as_ref()).await;
        }
        report
    }

    async fn user_link(&self, user_id: &str) -> UserLink {
        match self.host.lookup_user(user_id).await {
            Some(user) => UserLink {
                profile_url: user.profile_url,
                full_name: user.full_name,
            },
            None => UserLink {
                profile_url: None,
                full_name: user_id.to_owned(),
            },
        }
    }
}
