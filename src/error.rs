//! Error types for the `homebroker-rs` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, HomeBrokerError>`.
//!
//! [`HomeBrokerError`] covers:
//! - **Authentication errors**: Invalid or expired session context (terminal)
//! - **Connection errors**: Transport failures that trigger reconnection
//! - **Protocol errors**: Rejected or unacknowledged hub commands
//! - **Callback faults**: Failures raised inside user callbacks
//! - **HTTP / WebSocket / JSON / URL errors**: Lower-level failures
//! - **Invalid state / arguments**: Client-side misuse

use std::time::Duration;

use crate::ws::dispatcher::EventCategory;

/// Boxed error type returned by user callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All possible errors produced by the `homebroker-rs` client.
#[derive(Debug, thiserror::Error)]
pub enum HomeBrokerError {
    /// The session context is invalid or expired. Never retried.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A transport-level failure (network, handshake, dropped stream).
    #[error("Connection error: {0}")]
    Connection(String),

    /// A connection attempt did not complete in time.
    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The hub rejected a command or never acknowledged it.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A user callback returned an error or panicked.
    #[error("Callback fault in {category} handler: {source}")]
    CallbackFault {
        /// Category of the handler that failed.
        category: EventCategory,
        /// The original cause.
        #[source]
        source: CallbackError,
    },

    /// The operation is not allowed in the current connection state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The server returned an unexpected HTTP status code.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: reqwest::StatusCode,
        /// The response body text.
        body: String,
    },

    /// A network or transport-level error from `reqwest`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to (de)serialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for HomeBrokerError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

impl HomeBrokerError {
    /// Whether retrying the connection cannot succeed without a new session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// A panic caught at the callback boundary, carried as a [`CallbackError`].
#[derive(Debug, thiserror::Error)]
#[error("callback panicked: {0}")]
pub struct CallbackPanic(pub String);

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HomeBrokerError>;
