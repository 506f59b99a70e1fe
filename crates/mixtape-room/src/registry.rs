//! The connection registry: who is connected, and to which room.
//!
//! Each registered connection gets an unbounded outbound channel. The
//! writer half of the connection drains the receiver; everything else
//! in the process pushes events through the registry. A connection is
//! a member of at most ONE room at a time (key invariant) — binding it
//! to a second room silently moves it out of the first.
//!
//! All maps are sharded (`DashMap`), so registration, routing, and
//! broadcast never contend on a single lock. Methods that walk a
//! room's membership copy the ids out before sending, so no shard
//! guard is held across a channel push.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;

use mixtape_protocol::SessionId;
use mixtape_transport::ConnectionId;

use crate::RegistryError;

/// Channel sender for delivering events to one connection's writer.
pub type EventSender<E> = mpsc::UnboundedSender<E>;

/// Receiver half handed to the connection's writer task.
pub type EventReceiver<E> = mpsc::UnboundedReceiver<E>;

/// Tracks live connections and routes events to them, singly or by room.
///
/// Generic over the event type so the routing layer stays independent
/// of any one wire protocol.
pub struct ConnectionRegistry<E> {
    /// Outbound channel per live connection.
    senders: DashMap<ConnectionId, EventSender<E>>,

    /// Which room each connection is currently in, if any.
    rooms: DashMap<ConnectionId, SessionId>,

    /// Reverse index: the connections currently in each room.
    members: DashMap<SessionId, HashSet<ConnectionId>>,
}

impl<E> ConnectionRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            senders: DashMap::new(),
            rooms: DashMap::new(),
            members: DashMap::new(),
        }
    }

    /// Registers a connection and returns the receiver its writer task
    /// should drain. Events pushed before the writer starts draining
    /// are buffered, not lost.
    pub fn register(&self, id: ConnectionId) -> EventReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(id, tx);
        tracing::debug!(connection = %id, "connection registered");
        rx
    }

    /// Removes a connection entirely: its channel and any room
    /// membership. Returns the room it was in, if any, so callers can
    /// react to the departure.
    pub fn deregister(&self, id: ConnectionId) -> Option<SessionId> {
        self.senders.remove(&id);
        let room = self.unbind(id);
        tracing::debug!(connection = %id, "connection deregistered");
        room
    }

    /// Binds a connection to a room, moving it out of its previous
    /// room if it had one. Returns that previous room.
    ///
    /// Only registered connections can be bound; anything else would
    /// leave membership pointing at a channel that no longer exists.
    pub fn bind(
        &self,
        id: ConnectionId,
        session: SessionId,
    ) -> Result<Option<SessionId>, RegistryError> {
        if !self.senders.contains_key(&id) {
            return Err(RegistryError::NotRegistered(id));
        }

        let previous = self.unbind(id);
        self.rooms.insert(id, session);
        self.members.entry(session).or_default().insert(id);
        tracing::debug!(connection = %id, %session, "connection bound to room");
        Ok(previous)
    }

    /// Removes a connection from its room without touching its
    /// channel. Returns the room it was in.
    pub fn unbind(&self, id: ConnectionId) -> Option<SessionId> {
        let (_, session) = self.rooms.remove(&id)?;
        if let Some(mut set) = self.members.get_mut(&session) {
            set.remove(&id);
        }
        // Drop the entry once the last member leaves. `remove_if`
        // re-checks under the shard lock, so a concurrent bind that
        // repopulated the set keeps it.
        self.members.remove_if(&session, |_, set| set.is_empty());
        Some(session)
    }

    /// Returns the room a connection is currently in, if any.
    pub fn room_of(&self, id: ConnectionId) -> Option<SessionId> {
        self.rooms.get(&id).map(|entry| *entry)
    }

    /// Sends one event to one connection.
    ///
    /// Returns `false` if the connection is unknown or its writer is
    /// gone; the disconnect path deregisters it properly, so a failed
    /// send here is just a race with that.
    pub fn send_to(&self, id: ConnectionId, event: E) -> bool {
        match self.senders.get(&id) {
            Some(sender) => sender.send(event).is_ok(),
            None => {
                tracing::debug!(connection = %id, "send to unknown connection dropped");
                false
            }
        }
    }

    /// Broadcasts an event to every connection in a room. Returns how
    /// many connections it was delivered to.
    pub fn broadcast(&self, session: SessionId, event: E) -> usize
    where
        E: Clone,
    {
        self.broadcast_where(session, event, |_| true)
    }

    /// Broadcasts to every connection in a room except one, typically
    /// the connection whose action is being announced. Returns the
    /// delivery count.
    pub fn broadcast_except(
        &self,
        session: SessionId,
        except: ConnectionId,
        event: E,
    ) -> usize
    where
        E: Clone,
    {
        self.broadcast_where(session, event, |id| id != except)
    }

    fn broadcast_where(
        &self,
        session: SessionId,
        event: E,
        keep: impl Fn(ConnectionId) -> bool,
    ) -> usize
    where
        E: Clone,
    {
        // Copy ids out so no shard guard is held across sends.
        let ids = self.connections(session);
        let mut delivered = 0;
        for id in ids {
            if keep(id) && self.send_to(id, event.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Returns the connections currently in a room.
    pub fn connections(&self, session: SessionId) -> Vec<ConnectionId> {
        self.members
            .get(&session)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns how many connections are in a room.
    pub fn member_count(&self, session: SessionId) -> usize {
        self.members.get(&session).map(|set| set.len()).unwrap_or(0)
    }

    /// Returns the total number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }
}

impl<E> Default for ConnectionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
