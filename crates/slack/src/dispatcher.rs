use std::{ops::AddAssign, sync::Arc};

use {
    roomsync_channels::{
        ExternalSession, HostClient, IncomingEvent, OutgoingMembershipEvent, OutgoingMessage,
        OutgoingMessageEvent,
    },
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    directory::NameResolver,
    loop_guard::{self, LoopGuard},
    markup,
    registry::SinkRegistry,
};

/// Outcome of relaying one event to all of its destinations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    /// Destinations skipped because the content came from them.
    pub suppressed: usize,
    pub failed: usize,
}

impl AddAssign for RelayReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.suppressed += other.suppressed;
        self.failed += other.failed;
    }
}

/// Relays events for one sink in both directions.
pub struct RelayDispatcher {
    sink: String,
    registry: SinkRegistry,
    names: Arc<dyn NameResolver>,
    guard: LoopGuard,
    host: Arc<dyn HostClient>,
    edit_marker: String,
}

impl RelayDispatcher {
    pub fn new(
        sink: impl Into<String>,
        registry: SinkRegistry,
        names: Arc<dyn NameResolver>,
        guard: LoopGuard,
        host: Arc<dyn HostClient>,
        edit_marker: impl Into<String>,
    ) -> Self {
        Self {
            sink: sink.into(),
            registry,
            names,
            guard,
            host,
            edit_marker: edit_marker.into(),
        }
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    pub fn registry(&self) -> &SinkRegistry {
        &self.registry
    }

    /// Relay a Slack message into every mapped host conversation that did
    /// not originate it.
    pub async fn handle_incoming(&self, event: &IncomingEvent) -> Result<RelayReport> {
        let text = event
            .text
            .as_deref()
            .ok_or_else(|| Error::malformed("message has no text"))?;
        if !event.is_bot_origin && event.sender_id.is_none() {
            return Err(Error::malformed("message has no user"));
        }
        let room_id = event
            .room_id
            .as_deref()
            .ok_or_else(|| Error::malformed("message has no channel or group"))?;

        let mut report = RelayReport::default();
        let destinations = self.registry.hosts(room_id);
        if destinations.is_empty() {
            debug!(sink = %self.sink, channel_id = room_id, "no synced conversation for channel");
            return Ok(report);
        }

        let origin = self.guard.inspect(event);
        let username = match (&origin.username, &event.sender_id) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => self.names.resolve_user(id, id).await,
            (None, None) => String::new(),
        };
        let marker = if event.edited {
            self.edit_marker.as_str()
        } else {
            ""
        };
        let line = format!(
            "<b>{username}{marker}:</b> {}",
            markup::translate(text, self.names.as_ref()).await
        );

        for dest in destinations {
            if !LoopGuard::allows(&origin, &dest.name) {
                debug!(
                    sink = %self.sink,
                    conversation_id = %dest.id,
                    room = %dest.name,
                    "not relaying message back to its origin"
                );
                report.suppressed += 1;
                continue;
            }
            if self.deliver(&dest.id, &line).await {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    /// Direct delivery first, broadcast if the direct path declines or fails.
    async fn deliver(&self, conversation_id: &str, line: &str) -> bool {
        match self.host.send_direct_message(conversation_id, line).await {
            Ok(true) => return true,
            Ok(false) => {},
            Err(e) => {
                debug!(sink = %self.sink, conversation_id, error = %e, "direct delivery failed");
            },
        }
        match self.host.send_to_conversation(conversation_id, line).await {
            Ok(()) => true,
            Err(e) => {
                warn!(sink = %self.sink, conversation_id, error = %e, "host delivery failed");
                false
            },
        }
    }

    /// Post a host message to every mapped Slack channel, tagged with the
    /// room it came from.
    pub async fn handle_outgoing(
        &self,
        event: &OutgoingMessageEvent,
        session: &dyn ExternalSession,
    ) -> RelayReport {
        let mut report = RelayReport::default();
        for dest in self.registry.channels(&event.host_conversation_id) {
            let message = OutgoingMessage {
                channel_id: dest.id.clone(),
                text: event.text.clone(),
                username: Some(loop_guard::tag_sender(&event.sender_full_name, &dest.name)),
                icon_url: event.avatar_url.clone(),
                as_user: false,
            };
            self.post(session, &message, &mut report).await;
        }
        report
    }

    /// Post a host membership notice to every mapped Slack channel.
    pub async fn handle_membership(
        &self,
        event: &OutgoingMembershipEvent,
        session: &dyn ExternalSession,
    ) -> RelayReport {
        let mut report = RelayReport::default();
        for dest in self.registry.channels(&event.host_conversation_id) {
            let message = OutgoingMessage {
                channel_id: dest.id.clone(),
                text: loop_guard::membership_text(event, &dest.name),
                username: None,
                icon_url: None,
                as_user: true,
            };
            self.post(session, &message, &mut report).await;
        }
        report
    }

    async fn post(
        &self,
        session: &dyn ExternalSession,
        message: &OutgoingMessage,
        report: &mut RelayReport,
    ) {
        match session.post_message(message).await {
            Ok(()) => {
                debug!(sink = %self.sink, channel_id = %message.channel_id, "posted to slack");
                report.delivered += 1;
            },
            Err(e) => {
                warn!(
                    sink = %self.sink,
                    channel_id = %message.channel_id,
                    error = %e,
                    "slack delivery failed"
                );
                report.failed += 1;
            },
        }
    }
}
