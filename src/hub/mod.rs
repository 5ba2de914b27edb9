//! The `hub` module is the broadcast core of `chathub`.
//!
//! It tracks live connections in a registry and fans each chat message out to
//! every open connection. It knows nothing about sockets: transports hand it a
//! [`Channel`] per connection and drain whatever the hub pushes onto it.

pub mod channel;
pub mod connection;
pub mod engine;
pub mod message;
pub mod registry;

pub use channel::Channel;
pub use connection::{Connection, ConnectionId, ConnectionInfo, ConnectionState};
pub use engine::{BroadcastReport, Hub};
pub use message::ChatMessage;
pub use registry::ConnectionRegistry;
