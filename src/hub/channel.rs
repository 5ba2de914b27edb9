//! The push side of a connection.
//!
//! A `Channel` must not block: `push` either enqueues the message for the
//! connection's own writer or fails straight away. This keeps one slow
//! recipient from stalling a broadcast to everyone else.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::hub::ChatMessage;
use crate::utils::DeliveryError;

pub trait Channel: Send + Sync {
    /// Queue `message` for delivery to this connection.
    fn push(&self, message: &ChatMessage) -> Result<(), DeliveryError>;

    /// Called once the hub has dropped the connection from its registry.
    fn close(&self) {}
}

impl Channel for mpsc::UnboundedSender<ChatMessage> {
    fn push(&self, message: &ChatMessage) -> Result<(), DeliveryError> {
        self.send(message.clone()).map_err(|_| DeliveryError::Closed)
    }
}

impl Channel for mpsc::Sender<ChatMessage> {
    fn push(&self, message: &ChatMessage) -> Result<(), DeliveryError> {
        self.try_send(message.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
