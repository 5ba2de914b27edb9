//! Hub engine
//!
//! The `Hub` owns the connection registry and implements the three hub
//! operations: connect, disconnect and send.
//!
//! Concurrency notes:
//! - The registry sits behind one `std::sync::Mutex`. Every registry mutation
//!   and the snapshot taken at the start of a broadcast happen under that
//!   lock, and the lock is never held across an `.await` or a channel push.
//! - Delivery walks the snapshot after the lock is released. Each push is a
//!   non-blocking enqueue onto the recipient's own queue, so connections that
//!   join mid-broadcast are not included and a failing recipient cannot hold
//!   up the others.
//! - Recipients whose push failed are removed once the walk is over.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::HubSettings;
use crate::hub::{
    Channel, ChatMessage, ConnectionId, ConnectionInfo, ConnectionRegistry, ConnectionState,
};
use crate::utils::HubError;

/// Outcome of one successful `send_message` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients in the snapshot; one push was attempted for each.
    pub attempted: usize,
    pub delivered: usize,
    /// One `HubError::DeliveryFailed` per recipient that could not be reached.
    pub failures: Vec<HubError>,
}

impl BroadcastReport {
    pub fn failed_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.failures.iter().filter_map(|err| match err {
            HubError::DeliveryFailed(id) => Some(*id),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub struct Hub {
    registry: Mutex<ConnectionRegistry>,
    deliver_to_sender: bool,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(&HubSettings::default())
    }
}

impl Hub {
    pub fn new(settings: &HubSettings) -> Self {
        Self {
            registry: Mutex::new(ConnectionRegistry::new(settings.max_connections)),
            deliver_to_sender: settings.deliver_to_sender,
        }
    }

    /// A hub that holds at most `max_connections` and echoes to the sender.
    pub fn with_capacity(max_connections: usize) -> Self {
        Self::new(&HubSettings {
            max_connections,
            ..HubSettings::default()
        })
    }

    // Every critical section leaves the map consistent; poisoning is ignored.
    fn registry(&self) -> MutexGuard<'_, ConnectionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a channel in the `Connecting` state.
    ///
    /// The reservation counts toward capacity until it is opened or removed.
    pub fn reserve(&self, channel: Arc<dyn Channel>) -> Result<ConnectionId, HubError> {
        let mut registry = self.registry();
        match registry.insert(channel) {
            Ok(id) => {
                debug!(%id, "reserved connection");
                Ok(id)
            }
            Err(err) => {
                warn!(
                    "connection refused, registry full: {}/{}",
                    registry.len(),
                    registry.max_connections()
                );
                Err(err)
            }
        }
    }

    /// Move a reserved connection to `Open`.
    pub fn open(&self, id: ConnectionId) -> Result<(), HubError> {
        let mut registry = self.registry();
        let conn = registry
            .get_mut(id)
            .ok_or(HubError::UnknownConnection(id))?;
        conn.transition(ConnectionState::Open)?;
        info!("registered connection {id} ({} total)", registry.len());
        Ok(())
    }

    /// Register a channel and open it straight away.
    pub fn on_connect(&self, channel: Arc<dyn Channel>) -> Result<ConnectionId, HubError> {
        let id = self.reserve(channel)?;
        self.open(id)?;
        Ok(id)
    }

    /// Remove a connection. Idempotent: returns `false` if `id` was not
    /// registered.
    pub fn on_disconnect(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut registry = self.registry();
            if let Some(conn) = registry.get_mut(id) {
                if conn.state != ConnectionState::Closing {
                    let _ = conn.transition(ConnectionState::Closing);
                }
            }
            registry.remove(id).map(|conn| (conn, registry.len()))
        };

        match removed {
            Some((mut conn, remaining)) => {
                let _ = conn.transition(ConnectionState::Closed);
                conn.channel().close();
                let lived = chrono::Utc::now() - conn.connected_at;
                info!(
                    "unregistered connection {id} after {}s ({remaining} total remaining)",
                    lived.num_seconds()
                );
                true
            }
            None => false,
        }
    }

    /// Broadcast `(user_name, body)` from `id` to every open connection.
    ///
    /// The sender must be registered and open. Per-recipient failures are
    /// reported in the returned [`BroadcastReport`], never as an `Err`.
    pub fn send_message(
        &self,
        id: ConnectionId,
        user_name: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<BroadcastReport, HubError> {
        let message = ChatMessage::new(user_name, body);

        let recipients = {
            let mut registry = self.registry();
            let sender = registry.get_mut(id).ok_or(HubError::UnknownSender(id))?;
            if sender.state != ConnectionState::Open {
                return Err(HubError::NotOpen {
                    id,
                    state: sender.state,
                });
            }
            sender.user_name = Some(message.user_name.clone());

            let exclude = if self.deliver_to_sender { None } else { Some(id) };
            registry.snapshot(exclude)
        };

        let mut report = BroadcastReport::default();
        for (recipient, channel) in recipients {
            report.attempted += 1;
            match channel.push(&message) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(%recipient, error = %err, "delivery failed");
                    report.failures.push(HubError::DeliveryFailed(recipient));
                }
            }
        }

        for failed in report.failed_ids() {
            self.on_disconnect(failed);
        }

        debug!(
            sender = %id,
            attempted = report.attempted,
            delivered = report.delivered,
            "broadcast complete"
        );
        Ok(report)
    }

    pub fn connection_count(&self) -> usize {
        self.registry().len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.registry().contains(id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.registry().get(id).map(|conn| conn.info())
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry().iter().map(|conn| conn.info()).collect()
    }
}
