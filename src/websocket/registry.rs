use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::channel::mpsc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::websocket::protocol::ServerMessage;

/// Length of a generated connection id. 62^8 gives about 47 bits of entropy.
pub const ID_LEN: usize = 8;

/// Consecutive collisions tolerated before registration gives up.
pub const MAX_ID_ATTEMPTS: usize = 16;

/// Outbound half of a connection. The session drains the receiving side.
pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;

type IdGenerator = Box<dyn Fn() -> String + Send + Sync>;

pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

struct ClientConnection {
    tx: ConnectionSender,
    // Distinguishes two registrations that happened to draw the same id.
    serial: u64,
    connected_at: Instant,
}

/// What happened to a dispatched poke. Nothing is reported back to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    UnknownTarget,
    /// The target's handle was closed; it has been unregistered.
    TargetGone,
}

/// Live connections keyed by their server-assigned id.
///
/// Inserts go through the map's entry API, so check-then-insert is atomic.
/// A poke is sent while the target's shard is read-locked, which makes a
/// concurrent removal of the same id wait until the send has finished.
pub struct ConnectionRegistry {
    connections: DashMap<String, ClientConnection>,
    next_serial: AtomicU64,
    id_generator: IdGenerator,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_id_generator(generate_id)
    }

    pub fn with_id_generator<F>(id_generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            connections: DashMap::new(),
            next_serial: AtomicU64::new(0),
            id_generator: Box::new(id_generator),
        }
    }

    /// Assigns a fresh id to `tx`, queues the welcome on it and inserts it.
    ///
    /// The welcome is queued before the entry becomes visible, so it is
    /// always the first message the client receives. The returned guard
    /// unregisters the connection when dropped.
    pub fn register(self: &Arc<Self>, tx: ConnectionSender) -> Result<Registration, RelayError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = (self.id_generator)();
            match self.connections.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Connection id {} already taken, regenerating", id);
                }
                Entry::Vacant(slot) => {
                    tx.unbounded_send(ServerMessage::welcome(id.clone()))
                        .map_err(|e| RelayError::SendError(e.to_string()))?;

                    let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
                    slot.insert(ClientConnection {
                        tx,
                        serial,
                        connected_at: Instant::now(),
                    });
                    info!("Registered connection {}", id);

                    return Ok(Registration {
                        id,
                        serial,
                        registry: Arc::clone(self),
                    });
                }
            }
        }

        Err(RelayError::IdSpaceExhausted(MAX_ID_ATTEMPTS))
    }

    /// Relays a poke on behalf of `sender_id`.
    ///
    /// `raw_message` is taken verbatim as the target id. Text that names no
    /// registered connection is ignored. The sender is not checked.
    pub fn dispatch(&self, sender_id: &str, raw_message: &str) -> DispatchOutcome {
        let failed_serial = match self.connections.get(raw_message) {
            None => {
                debug!("{} poked unknown id {:?}", sender_id, raw_message);
                return DispatchOutcome::UnknownTarget;
            }
            Some(target) => match target.tx.unbounded_send(ServerMessage::poke()) {
                Ok(()) => {
                    debug!("Relayed poke from {} to {}", sender_id, raw_message);
                    return DispatchOutcome::Delivered;
                }
                Err(e) => {
                    warn!("Failed to relay poke from {} to {}: {}", sender_id, raw_message, e);
                    target.serial
                }
            },
        };

        if self.remove_exact(raw_message, failed_serial) {
            info!("Unregistered unreachable connection {}", raw_message);
        }
        DispatchOutcome::TargetGone
    }

    /// Removes `id` if present. Returns whether an entry was removed.
    pub fn unregister(&self, id: &str) -> bool {
        match self.connections.remove(id) {
            Some((_, conn)) => {
                info!(
                    "Unregistered connection {} after {:?}",
                    id,
                    conn.connected_at.elapsed()
                );
                true
            }
            None => false,
        }
    }

    fn remove_exact(&self, id: &str, serial: u64) -> bool {
        self.connections
            .remove_if(id, |_, conn| conn.serial == serial)
            .is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_ids(&self) -> Vec<String> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a connection registered for as long as it is alive.
pub struct Registration {
    id: String,
    serial: u64,
    registry: Arc<ConnectionRegistry>,
}

impl Registration {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        // Only removes our own entry, never a later connection that drew the same id.
        if self.registry.remove_exact(&self.id, self.serial) {
            info!("Unregistered connection {}", self.id);
        }
    }
}
