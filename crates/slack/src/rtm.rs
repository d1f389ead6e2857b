//! Slack RTM websocket session and the production connector.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    roomsync_channels::{
        DirectorySnapshot, ExternalConnector, ExternalSession, OutgoingMessage, SessionInfo,
    },
    secrecy::Secret,
    serde_json::Value,
    tokio::{
        sync::mpsc::{self, error::TryRecvError},
        task::JoinHandle,
    },
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::api::SlackApi;

/// Upper bound for one Web API request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound for the websocket handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// A live websocket: inbound events, outbound frames and the two pump tasks.
struct RtmConnection {
    events: mpsc::UnboundedReceiver<Value>,
    write_tx: mpsc::UnboundedSender<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for RtmConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn open(url: &str) -> crate::Result<RtmConnection> {
    let (ws, _) = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| crate::Error::message("rtm websocket handshake timed out"))??;
    let (mut write, mut read) = ws.split();
    let (event_tx, events) = mpsc::unbounded_channel();
    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();

    let reader = tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<Value>(text.as_str()) {
                    Ok(event) => {
                        if event_tx.send(event).is_err() {
                            break;
                        }
                    },
                    Err(e) => warn!(error = %e, "ignoring undecodable rtm frame"),
                },
                Ok(Message::Close(frame)) => {
                    info!(?frame, "rtm connection closed by slack");
                    break;
                },
                Ok(_) => {},
                Err(e) => {
                    warn!(error = %e, "rtm read failed");
                    break;
                },
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(text) = write_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                warn!(error = %e, "rtm write failed");
                break;
            }
        }
    });

    Ok(RtmConnection {
        events,
        write_tx,
        tasks: vec![reader, writer],
    })
}

/// One Slack RTM session: websocket for events and pings, Web API for
/// posting and the directory.
pub struct RtmSession {
    api: SlackApi,
    connection: Mutex<Option<RtmConnection>>,
    next_ping_id: AtomicU64,
}

impl RtmSession {
    pub fn new(api: SlackApi) -> Self {
        Self {
            api,
            connection: Mutex::new(None),
            next_ping_id: AtomicU64::new(1),
        }
    }

    fn not_connected() -> roomsync_channels::Error {
        roomsync_channels::Error::unavailable("rtm session is not connected")
    }
}

#[async_trait]
impl ExternalSession for RtmSession {
    async fn connect(&self) -> roomsync_channels::Result<SessionInfo> {
        let endpoint = self.api.rtm_connect().await?;
        let connection = open(&endpoint.url).await?;
        *self.connection.lock().unwrap_or_else(|e| e.into_inner()) = Some(connection);
        debug!(self_id = %endpoint.self_id, "rtm websocket open");

        let directory = self.api.directory().await?;
        Ok(SessionInfo {
            self_id: endpoint.self_id,
            directory,
        })
    }

    async fn poll_events(&self) -> roomsync_channels::Result<Vec<Value>> {
        let mut guard = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let connection = guard.as_mut().ok_or_else(Self::not_connected)?;

        let mut batch = Vec::new();
        loop {
            match connection.events.try_recv() {
                Ok(event) => batch.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Hand out what arrived before the close; the next poll fails.
                    if batch.is_empty() {
                        *guard = None;
                        return Err(roomsync_channels::Error::unavailable(
                            "rtm connection closed",
                        ));
                    }
                    break;
                },
            }
        }
        Ok(batch)
    }

    async fn post_message(&self, message: &OutgoingMessage) -> roomsync_channels::Result<()> {
        Ok(self.api.post_message(message).await?)
    }

    async fn send_ping(&self) -> roomsync_channels::Result<()> {
        let id = self.next_ping_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::json!({ "id": id, "type": "ping" }).to_string();
        let guard = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let connection = guard.as_ref().ok_or_else(Self::not_connected)?;
        connection
            .write_tx
            .send(frame)
            .map_err(|_| roomsync_channels::Error::unavailable("rtm writer stopped"))
    }

    async fn directory(&self) -> roomsync_channels::Result<DirectorySnapshot> {
        Ok(self.api.directory().await?)
    }
}

/// Builds [`RtmSession`]s against the Slack API.
#[derive(Clone)]
pub struct SlackConnector {
    client: reqwest::Client,
    base_url: String,
}

impl SlackConnector {
    pub fn new(base_url: impl Into<String>) -> crate::Result<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl ExternalConnector for SlackConnector {
    fn session(&self, credential: &Secret<String>) -> Arc<dyn ExternalSession> {
        Arc::new(RtmSession::new(SlackApi::new(
            self.client.clone(),
            self.base_url.clone(),
            credential.clone(),
        )))
    }
}
