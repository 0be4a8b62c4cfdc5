//! Live connections and their queue/match membership.

use crate::matches::MatchId;
use crate::protocol::ServerEvent;
use derive_getters::Getters;
use derive_new::new;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Stable player key (the authenticated username).
pub type PlayerKey = String;

/// Transient identity of one transport connection.
pub type ConnectionId = u64;

/// Outbound event channel of one connection.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Authenticated identity supplied by the connection handshake.
#[derive(Debug, Clone, PartialEq, Eq, Getters, new)]
pub struct Identity {
    /// Username, used as the player key.
    username: PlayerKey,
    /// External user id, echoed back to the client.
    user_id: String,
}

/// A live connection.
#[derive(Debug, Clone, Getters)]
pub struct Session {
    /// Who is on the other end.
    identity: Identity,
    /// Channel to the connection's writer task.
    outbox: Outbox,
}

/// Current membership of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    /// Waiting in the matchmaking queue.
    Queued,
    /// Seated in a live match.
    Playing(MatchId),
}

/// All live connections, indexed both ways.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    by_player: HashMap<PlayerKey, ConnectionId>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection; returns false if the player key is already
    /// bound to another live connection.
    #[instrument(skip(self, outbox), fields(player = %identity.username()))]
    pub fn register(&mut self, connection: ConnectionId, identity: Identity, outbox: Outbox) -> bool {
        if self.by_player.contains_key(identity.username()) {
            return false;
        }
        self.by_player.insert(identity.username().clone(), connection);
        self.sessions.insert(connection, Session { identity, outbox });
        true
    }

    /// Drops a connection and returns its session.
    pub fn remove(&mut self, connection: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&connection)?;
        self.by_player.remove(session.identity.username());
        Some(session)
    }

    /// Looks up a connection.
    pub fn get(&self, connection: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection)
    }

    /// Connection currently bound to a player key.
    pub fn connection_of(&self, player: &str) -> Option<ConnectionId> {
        self.by_player.get(player).copied()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sends an event to one connection. Closed channels are ignored; the
    /// transport reports the disconnect separately.
    pub fn send(&self, connection: ConnectionId, event: ServerEvent) {
        match self.sessions.get(&connection) {
            Some(session) => {
                if session.outbox.send(event).is_err() {
                    debug!(connection, "Outbox closed, dropping event");
                }
            }
            None => debug!(connection, "No session for outbound event"),
        }
    }

    /// Sends an event to every live connection.
    pub fn broadcast(&self, event: &ServerEvent) {
        for (connection, session) in &self.sessions {
            if session.outbox.send(event.clone()).is_err() {
                debug!(connection, "Outbox closed, skipping broadcast");
            }
        }
    }
}

/// Queue/match membership per connection.
#[derive(Debug, Default)]
pub struct PresenceStore {
    records: HashMap<ConnectionId, Presence>,
}

impl PresenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a connection as queued.
    pub fn set_queued(&mut self, connection: ConnectionId) {
        self.records.insert(connection, Presence::Queued);
    }

    /// Records a connection as playing in `id`.
    pub fn set_playing(&mut self, connection: ConnectionId, id: MatchId) {
        if let Some(Presence::Playing(previous)) = self.records.insert(connection, Presence::Playing(id)) {
            warn!(connection, %previous, match_id = %id, "Connection moved between matches");
        }
    }

    /// Current membership of a connection.
    pub fn get(&self, connection: ConnectionId) -> Option<Presence> {
        self.records.get(&connection).copied()
    }

    /// Drops a connection's record.
    pub fn remove(&mut self, connection: ConnectionId) -> Option<Presence> {
        self.records.remove(&connection)
    }

    /// Drops the record only if it still references match `id`.
    pub fn release_match(&mut self, connection: ConnectionId, id: MatchId) {
        if self.records.get(&connection) == Some(&Presence::Playing(id)) {
            self.records.remove(&connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity::new(name.to_string(), format!("{name}-id"))
    }

    #[test]
    fn test_player_key_binds_one_connection() {
        let mut registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(registry.register(1, identity("alice"), tx.clone()));
        assert!(!registry.register(2, identity("alice"), tx.clone()));
        assert_eq!(registry.connection_of("alice"), Some(1));

        registry.remove(1);
        assert!(registry.connection_of("alice").is_none());
        assert!(registry.register(2, identity("alice"), tx));
    }

    #[test]
    fn test_release_ignores_other_matches() {
        let mut presence = PresenceStore::new();
        let a = MatchId::from_raw(1);
        let b = MatchId::from_raw(2);
        presence.set_playing(10, a);
        presence.release_match(10, b);
        assert_eq!(presence.get(10), Some(Presence::Playing(a)));
        presence.release_match(10, a);
        assert_eq!(presence.get(10), None);
    }
}
