//! Error types for `chathub`.
//!
//! Every failure is local to the operation that produced it. Nothing here
//! tears down the hub.

use thiserror::Error;

use crate::hub::{ConnectionId, ConnectionState};

/// Failures raised by the broadcast hub.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The registry already holds the configured maximum of connections.
    #[error("connection registry is full ({max} connections)")]
    CapacityExceeded { max: usize },

    /// A message was sent from an id that is not registered.
    #[error("unknown sender {0}")]
    UnknownSender(ConnectionId),

    /// A single recipient could not be reached.
    #[error("delivery to {0} failed")]
    DeliveryFailed(ConnectionId),

    /// The connection exists but is not in the `Open` state.
    #[error("connection {id} is {state}, not open")]
    NotOpen {
        id: ConnectionId,
        state: ConnectionState,
    },

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("connection {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ConnectionId,
        from: ConnectionState,
        to: ConnectionState,
    },
}

/// Why a single push onto a connection's channel failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("channel closed")]
    Closed,

    /// The recipient's outbound queue is full; the client is too slow.
    #[error("channel full")]
    Full,
}

/// Why a client invocation was rejected. Sent back to the caller as the
/// completion error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("unknown hub method '{0}'")]
    UnknownMethod(String),

    #[error("{method} expects {expected} arguments, got {got}")]
    ArgumentCount {
        method: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Failures of the WebSocket server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),

    #[error("invalid server settings: {0}")]
    InvalidSettings(#[from] config::ConfigError),
}

/// Failures surfaced to callers of the hub client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    Connect(#[from] tungstenite::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection is not established")]
    NotConnected,

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The server answered the invocation with an error.
    #[error("invocation failed: {0}")]
    Invocation(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}
