//! Wire frames. Every frame is a JSON object tagged by `"type"`.
//!
//! ```json
//! {"type":"invocation","invocation_id":"1","target":"SendMessage","arguments":["alice","hi"]}
//! {"type":"invocation","target":"ReceiveMessage","arguments":["alice","hi"]}
//! {"type":"completion","invocation_id":"1"}
//! {"type":"completion","invocation_id":"2","error":"unknown sender conn-..."}
//! {"type":"close","error":"connection registry is full (2 connections)"}
//! ```

use serde::{Deserialize, Serialize};
use tungstenite::protocol::Message as WsMessage;

use crate::hub::ChatMessage;

/// Client-to-server method that broadcasts a chat message.
pub const SEND_MESSAGE: &str = "SendMessage";
/// Server-to-client method carrying a broadcast chat message.
pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Call a hub method. Without an `invocation_id` no completion is sent.
    Invocation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invocation_id: Option<String>,
        target: String,
        #[serde(default)]
        arguments: Vec<String>,
    },
}

impl ClientMessage {
    pub fn send_message(
        invocation_id: Option<String>,
        user_name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        ClientMessage::Invocation {
            invocation_id,
            target: SEND_MESSAGE.to_string(),
            arguments: vec![user_name.into(), body.into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Invocation {
        target: String,
        #[serde(default)]
        arguments: Vec<String>,
    },
    Completion {
        invocation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Sent right before the server closes the socket.
    Close {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ServerMessage {
    pub fn to_ws(&self) -> Result<WsMessage, serde_json::Error> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}

impl From<&ChatMessage> for ServerMessage {
    fn from(message: &ChatMessage) -> Self {
        ServerMessage::Invocation {
            target: RECEIVE_MESSAGE.to_string(),
            arguments: vec![message.user_name.clone(), message.body.clone()],
        }
    }
}
