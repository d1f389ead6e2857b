//! Slack ↔ host room relay.
//!
//! One [`ConnectionWorker`] per configured sink keeps a Slack RTM session
//! open and relays channel messages into host conversations. Host messages
//! and membership changes flow the other way through the [`SinkHub`].

pub mod api;
pub mod directory;
pub mod dispatcher;
pub mod emoji;
pub mod error;
pub mod events;
pub mod hub;
pub mod loop_guard;
pub mod markup;
pub mod pool;
pub mod registry;
pub mod rtm;
pub mod worker;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod testing;

pub use {
    directory::{DirectoryCache, NameResolver},
    dispatcher::{RelayDispatcher, RelayReport},
    error::{Error, Result},
    hub::SinkHub,
    loop_guard::LoopGuard,
    registry::{RoomLink, SinkRegistry},
    rtm::{RtmSession, SlackConnector},
    worker::{ConnectionWorker, WorkerHandle, WorkerSettings, WorkerState},
};
