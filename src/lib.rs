//! # chathub
//!
//! `chathub` is an in-memory, real-time broadcast hub. Clients connect over
//! WebSockets, invoke `SendMessage(user, message)` and every connected client
//! (the sender included, unless configured otherwise) receives
//! `ReceiveMessage(user, message)`. Nothing is persisted.
//!
//! ## Core Modules
//!
//! - `hub`: the connection registry and message fan-out.
//! - `transport`: the WebSocket server and the JSON frame format.
//! - `client`: a hub client with automatic reconnection.
//! - `config`: layered configuration (defaults, file, environment).
//! - `utils`: error types and tracing setup.

pub mod client;
pub mod config;
pub mod hub;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
