//! Collaborator interfaces for the relay.
//!
//! The host chat platform and the external platform (Slack) are consumed
//! through the [`HostClient`] and [`ExternalSession`] traits; the types
//! here are the normalized events and messages that flow between them.

pub mod error;
pub mod event;
pub mod external;
pub mod host;

pub use {
    error::{Error, Result},
    event::{IncomingEvent, OutgoingMembershipEvent, OutgoingMessageEvent, UserLink},
    external::{
        DirectoryEntry, DirectorySnapshot, ExternalConnector, ExternalSession, OutgoingMessage,
        SessionInfo,
    },
    host::{
        HostClient, HostConversation, HostMembershipEvent, HostMessageEvent, HostUser,
        MembershipChange,
    },
};
