use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::hub::{Channel, Connection, ConnectionId, ConnectionState};
use crate::utils::HubError;

/// Map of live connections keyed by id.
///
/// The registry itself is not synchronized; the [`Hub`](crate::hub::Hub)
/// keeps it behind a single mutex so that inserts, removals and broadcast
/// snapshots never interleave.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
        }
    }

    /// Register `channel` under a fresh id, in the `Connecting` state.
    pub fn insert(&mut self, channel: Arc<dyn Channel>) -> Result<ConnectionId, HubError> {
        if self.connections.len() >= self.max_connections {
            return Err(HubError::CapacityExceeded {
                max: self.max_connections,
            });
        }

        loop {
            let id = ConnectionId::new();
            if let Entry::Vacant(slot) = self.connections.entry(id) {
                slot.insert(Connection::new(id, channel));
                return Ok(id);
            }
        }
    }

    /// Remove a connection. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Channels of every open connection, optionally leaving one out.
    pub fn snapshot(&self, exclude: Option<ConnectionId>) -> Vec<(ConnectionId, Arc<dyn Channel>)> {
        self.connections
            .values()
            .filter(|conn| conn.state == ConnectionState::Open)
            .filter(|conn| Some(conn.id) != exclude)
            .map(|conn| (conn.id, Arc::clone(conn.channel())))
            .collect()
    }
}
