use thiserror::Error;

/// Slack API error codes that no reconnect can fix.
const PERMANENT_API_ERRORS: &[&str] = &[
    "account_inactive",
    "invalid_auth",
    "missing_scope",
    "not_allowed_token_type",
    "not_authed",
    "token_revoked",
];

#[derive(Debug, Error)]
pub enum Error {
    /// An inbound event lacks a field the relay needs.
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// Slack answered with `"ok": false`.
    #[error("slack api {method} failed: {error}")]
    Api { method: String, error: String },

    #[error(transparent)]
    Channel(#[from] roomsync_channels::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn api(method: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Api {
            method: method.into(),
            error: error.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Errors that a fresh session cannot recover from, such as a revoked
    /// token. Workers never reconnect after one of these.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Api { error, .. } => PERMANENT_API_ERRORS.contains(&error.as_str()),
            Self::Channel(roomsync_channels::Error::External { source, .. }) => source
                .downcast_ref::<Self>()
                .is_some_and(Self::is_permanent),
            _ => false,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}

/// Slack failures surface through the collaborator traits as external
/// channel errors; the original is kept as the source.
impl From<Error> for roomsync_channels::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Channel(inner) => inner,
            other => Self::external("slack", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
