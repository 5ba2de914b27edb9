//! The `client` module is the consumer side of the hub.
//!
//! [`HubConnection`] keeps one WebSocket session to a hub server, exposes
//! `SendMessage` as an async call and reports everything else (incoming
//! messages and lifecycle changes) as [`ClientEvent`]s on a channel.

pub mod hub_client;
pub mod reconnect;

pub use hub_client::{ClientEvent, ClientState, HubConnection, HubConnectionBuilder};
pub use reconnect::ReconnectPolicy;
