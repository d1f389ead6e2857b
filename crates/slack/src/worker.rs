use std::{sync::Arc, time::Duration};

use {
    roomsync_channels::{ExternalConnector, ExternalSession, HostClient},
    roomsync_config::{ReconnectPolicy, RelayConfig, SinkConfig},
    serde_json::Value,
    tokio::{sync::watch, task::JoinHandle, time::Instant},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    Result,
    directory::DirectoryCache,
    dispatcher::RelayDispatcher,
    events::{self, RtmEvent},
    hub::SinkHub,
    loop_guard::LoopGuard,
    registry::SinkRegistry,
};

/// Lifecycle of a connection worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Disconnected,
    Connecting,
    Connected,
    Terminated,
}

/// Loop tuning taken from the relay config.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub keepalive_interval: Duration,
    pub edit_marker: String,
    pub reconnect: ReconnectPolicy,
}

impl From<&RelayConfig> for WorkerSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            keepalive_interval: config.keepalive_interval(),
            edit_marker: config.edit_marker.clone(),
            reconnect: config.reconnect.clone(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// Tracks when the next keepalive probe is due.
#[derive(Debug)]
pub struct KeepaliveTimer {
    interval: Duration,
    last: Instant,
}

impl KeepaliveTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: now,
        }
    }

    /// True (and rearmed) once at least one interval passed since the last
    /// probe.
    pub fn due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Handle to a spawned worker.
pub struct WorkerHandle {
    sink: String,
    cancel: CancellationToken,
    state: watch::Receiver<WorkerState>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn sink(&self) -> &str {
        &self.sink
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(sink = %self.sink, error = %e, "worker task failed");
        }
    }
}

/// Owns the Slack session of one sink and runs its poll loop.
pub struct ConnectionWorker {
    sink: String,
    config: SinkConfig,
    settings: WorkerSettings,
    connector: Arc<dyn ExternalConnector>,
    host: Arc<dyn HostClient>,
    hub: Arc<SinkHub>,
}

impl ConnectionWorker {
    pub fn new(
        sink: impl Into<String>,
        config: SinkConfig,
        settings: WorkerSettings,
        connector: Arc<dyn ExternalConnector>,
        host: Arc<dyn HostClient>,
        hub: Arc<SinkHub>,
    ) -> Self {
        Self {
            sink: sink.into(),
            config,
            settings,
            connector,
            host,
            hub,
        }
    }

    /// Spawn the worker on the current runtime. Cancelling `cancel` stops it.
    pub fn spawn(self, cancel: CancellationToken) -> WorkerHandle {
        let (state_tx, state_rx) = watch::channel(WorkerState::Disconnected);
        let sink = self.sink.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run(task_cancel, state_tx).await });
        WorkerHandle {
            sink,
            cancel,
            state: state_rx,
            task,
        }
    }

    async fn run(self, cancel: CancellationToken, state: watch::Sender<WorkerState>) {
        let mut attempt: u32 = 0;
        loop {
            state.send_replace(WorkerState::Connecting);
            let result = self.run_session(&cancel, &state).await;
            self.hub.deregister(&self.sink);

            let Err(e) = result else {
                break;
            };
            if cancel.is_cancelled() {
                break;
            }
            if *state.borrow() == WorkerState::Connected {
                attempt = 0;
            }
            state.send_replace(WorkerState::Disconnected);

            if e.is_permanent() {
                error!(sink = %self.sink, error = %e, "worker terminated, credential rejected");
                break;
            }
            let Some(delay) = self.settings.reconnect.delay_for(attempt) else {
                error!(sink = %self.sink, error = %e, attempts = attempt, "worker terminated");
                break;
            };
            attempt += 1;
            warn!(
                sink = %self.sink,
                error = %e,
                attempt,
                ?delay,
                "session lost, reconnecting"
            );
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {},
            }
        }
        state.send_replace(WorkerState::Terminated);
        info!(sink = %self.sink, "worker stopped");
    }

    /// Connect and poll until cancelled (`Ok`) or the session fails.
    async fn run_session(
        &self,
        cancel: &CancellationToken,
        state: &watch::Sender<WorkerState>,
    ) -> Result<()> {
        let session = self.connector.session(&self.config.credential_key);
        let (self_id, dispatcher) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            setup = self.open_session(&session) => setup?,
        };
        state.send_replace(WorkerState::Connected);
        info!(sink = %self.sink, self_id = %self_id, "slack session connected");

        let mut keepalive = KeepaliveTimer::new(self.settings.keepalive_interval, Instant::now());
        let mut awaiting_first_batch = true;
        loop {
            let batch = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                batch = session.poll_events() => batch?,
            };
            if !batch.is_empty() {
                let handshake = awaiting_first_batch && events::is_handshake(&batch);
                awaiting_first_batch = false;
                if handshake {
                    debug!(sink = %self.sink, events = batch.len(), "discarding handshake batch");
                } else {
                    for raw in &batch {
                        self.dispatch(&dispatcher, raw).await;
                    }
                }
            }

            if keepalive.due(Instant::now()) {
                session.send_ping().await?;
            }

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.settings.poll_interval) => {},
            }
        }
    }

    /// Connect, map the rooms and register with the hub. Returns the bot's
    /// own user id and the dispatcher for inbound events.
    async fn open_session(
        &self,
        session: &Arc<dyn ExternalSession>,
    ) -> Result<(String, Arc<RelayDispatcher>)> {
        let info = session.connect().await?;
        debug!(
            sink = %self.sink,
            users = info.directory.users.len(),
            channels = info.directory.channels.len(),
            "directory loaded"
        );

        let registry = SinkRegistry::build(&self.sink, &self.config, self.host.as_ref()).await?;
        let directory = Arc::new(DirectoryCache::new(Arc::clone(session), info.directory));
        let dispatcher = Arc::new(RelayDispatcher::new(
            self.sink.clone(),
            registry,
            directory,
            LoopGuard::new(info.self_id.clone()),
            Arc::clone(&self.host),
            self.settings.edit_marker.clone(),
        ));
        self.hub
            .register(self.config.credential_key.clone(), Arc::clone(&dispatcher));
        Ok((info.self_id, dispatcher))
    }

    /// Handle one raw event. Failures are logged and never end the loop.
    async fn dispatch(&self, dispatcher: &RelayDispatcher, raw: &Value) {
        match events::classify(raw) {
            Ok(RtmEvent::Message(event)) => match dispatcher.handle_incoming(&event).await {
                Ok(report) => debug!(
                    sink = %self.sink,
                    delivered = report.delivered,
                    suppressed = report.suppressed,
                    failed = report.failed,
                    "relayed slack message"
                ),
                Err(e) => warn!(sink = %self.sink, error = %e, "dropping slack event"),
            },
            Ok(RtmEvent::Hello | RtmEvent::Noop(_)) => {},
            Ok(RtmEvent::Other(kind)) => debug!(sink = %self.sink, kind = %kind, "ignoring slack event"),
            Err(e) => warn!(sink = %self.sink, error = %e, event = %raw, "dropping slack event"),
        }
    }
}
