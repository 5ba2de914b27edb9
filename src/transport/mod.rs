//! The `transport` module carries the hub over WebSockets.
//!
//! It defines the JSON frames exchanged with clients and the server that
//! accepts sockets, registers one hub connection per socket, turns client
//! invocations into hub calls and drains each connection's outbound queue.

pub mod message;
pub mod websocket;

pub use message::{ClientMessage, ServerMessage};
pub use websocket::{WebSocketServer, start_websocket_server};

#[cfg(test)]
mod tests;
