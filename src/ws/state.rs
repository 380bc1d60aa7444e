//! Connection state machine.
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected ──► Reconnecting ──► Connecting
//!       ▲               │              │               │
//!       └───────────────┴──────────────┴───────────────┘
//! ```
//!
//! A failed reconnect attempt moves `Connecting` back to `Reconnecting`.
//! Any other transition is rejected.

use std::fmt;

use tokio::sync::watch;

use crate::error::{HomeBrokerError, Result};

/// Lifecycle state of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connecting, Reconnecting)
                | (Connected, Reconnecting)
                | (Connected, Disconnected)
                | (Reconnecting, Connecting)
                | (Reconnecting, Disconnected)
        )
    }

    /// Whether commands can be written to the transport.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Shared, observable holder of the [`ConnectionState`].
///
/// Transitions are checked and applied atomically under the channel's lock.
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<ConnectionState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// A machine in the `Disconnected` state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    /// The current state.
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// A receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&self, next: ConnectionState) -> Result<ConnectionState> {
        let mut previous = None;
        self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                previous = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        match previous {
            Some(from) => {
                tracing::debug!(%from, to = %next, "Connection state changed");
                Ok(from)
            }
            None => Err(HomeBrokerError::InvalidState(format!(
                "cannot move from {} to {next}",
                self.current()
            ))),
        }
    }
}
