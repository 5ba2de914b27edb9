use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::hub::Channel;
use crate::utils::HubError;

/// Opaque identifier of one live session.
///
/// Never sent to clients; a reconnecting client always gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection: `Connecting -> Open -> Closing -> Closed`.
///
/// A connection that never finishes its handshake goes straight from
/// `Connecting` to `Closing`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Closing) | (Open, Closing) | (Closing, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A registered session, owned by the [`ConnectionRegistry`](crate::hub::ConnectionRegistry).
pub struct Connection {
    pub id: ConnectionId,
    pub state: ConnectionState,
    /// Display name from the most recent message this connection sent.
    pub user_name: Option<String>,
    pub connected_at: DateTime<Utc>,
    channel: Arc<dyn Channel>,
}

impl Connection {
    pub fn new(id: ConnectionId, channel: Arc<dyn Channel>) -> Self {
        Self {
            id,
            state: ConnectionState::Connecting,
            user_name: None,
            connected_at: Utc::now(),
            channel,
        }
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn transition(&mut self, next: ConnectionState) -> Result<(), HubError> {
        if !self.state.can_transition_to(next) {
            return Err(HubError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            state: self.state,
            user_name: self.user_name.clone(),
            connected_at: self.connected_at,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("user_name", &self.user_name)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of a connection's public fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub user_name: Option<String>,
    pub connected_at: DateTime<Utc>,
}
