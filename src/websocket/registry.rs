//! Connection registry and room index.
//!
//! Both structures are plain maps; the [`ChatRelay`](crate::websocket::ChatRelay)
//! keeps them behind a single lock and mutates them only together, which is what
//! upholds the registry/room consistency invariant.

use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Unique identifier for one live socket, assigned at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Participant identity resolved at join time.
///
/// No uniqueness constraint on `(session_id, user_id)`: the same user may hold
/// several concurrent connections (multiple tabs), each tracked independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
}

/// One registered connection: identity plus its outbound frame channel.
pub struct Connection {
    pub identity: Identity,
    pub sender: UnboundedSender<String>,
}

/// connection id -> identity + outbound channel
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn register(
        &mut self,
        id: ConnectionId,
        identity: Identity,
        sender: UnboundedSender<String>,
    ) {
        self.entries.insert(id, Connection { identity, sender });
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<&Connection> {
        self.entries.get(&id)
    }

    /// Idempotent: removing an absent connection is a no-op.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        self.entries.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// session id -> member set
#[derive(Default)]
pub struct RoomIndex {
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RoomIndex {
    /// Add a member, lazily creating the room. Returns false when the
    /// connection was already a member (re-join does not duplicate membership).
    pub fn join(&mut self, session_id: &str, id: ConnectionId) -> bool {
        self.rooms.entry(session_id.to_string()).or_default().insert(id)
    }

    /// Remove a member; the room entry itself is dropped as soon as it empties.
    pub fn leave(&mut self, session_id: &str, id: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(session_id) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(session_id);
            }
        }
    }

    /// Current fan-out target set; empty for unknown sessions, never an error.
    pub fn members_of(&self, session_id: &str) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms.get(session_id).into_iter().flatten().copied()
    }

    pub fn member_count(&self, session_id: &str) -> usize {
        self.rooms.get(session_id).map(|m| m.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
