use std::error::Error as StdError;

/// Crate-wide result type for collaborator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared by the host and external platform traits.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    /// Operation is currently unavailable (session closed, not connected).
    #[error("channel operation unavailable: {message}")]
    Unavailable { message: String },

    /// A platform accepted the request but refused to deliver it.
    #[error("delivery to {destination} failed: {message}")]
    Delivery {
        destination: String,
        message: String,
    },

    /// Wrapped source error from an external dependency.
    #[error("channel operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn delivery(destination: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Delivery {
            destination: destination.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
