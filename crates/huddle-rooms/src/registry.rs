use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use huddle_core::ConnId;
use tokio::sync::mpsc;

/// Default bound for one member's outbound send queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A connection bound to a username within a room.
#[derive(Clone)]
pub struct Member {
    pub conn: ConnId,
    pub username: String,
    pub tx: mpsc::Sender<String>,
}

/// Online/offline state per (room, username). Absent means never seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Online,
    Offline { last_seen: DateTime<Utc> },
}

#[derive(Default)]
struct RoomState {
    members: Vec<Member>,
    presence: HashMap<String, Presence>,
}

/// Owns all room membership and presence state.
///
/// Rooms are created lazily on first join and never destroyed. Every
/// operation touches exactly one room entry while holding its shard lock, so
/// a room's membership is never observed half-updated. Within a room at most
/// one member exists per username: join evicts any prior entry for the same
/// username, while leave removes strictly by connection identity so a stale
/// socket's late disconnect cannot clobber the session that replaced it.
pub struct RoomRegistry {
    rooms: DashMap<String, RoomState>,
    queue_capacity: usize,
}

impl RoomRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            queue_capacity,
        }
    }

    /// Join `username` to `room`, evicting any prior member with the same
    /// username. Returns the new connection's id and the receiving end of
    /// its send queue. Dropping the evicted member's sender is what closes
    /// the old connection's writer.
    pub fn join(&self, room: &str, username: &str) -> (ConnId, mpsc::Receiver<String>) {
        let conn = ConnId::new();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut state = self.rooms.entry(room.to_owned()).or_default();
        state.members.retain(|m| m.username != username);
        state.members.push(Member {
            conn: conn.clone(),
            username: username.to_owned(),
            tx,
        });
        state.presence.insert(username.to_owned(), Presence::Online);
        (conn, rx)
    }

    /// Remove the member with this connection id and flip its username
    /// offline. Returns the recorded last-seen time, or `None` when the
    /// entry was already replaced by a newer session, in which case
    /// membership and presence are left untouched.
    pub fn leave(&self, room: &str, conn: &ConnId) -> Option<DateTime<Utc>> {
        let mut state = self.rooms.get_mut(room)?;
        let idx = state.members.iter().position(|m| &m.conn == conn)?;
        let member = state.members.remove(idx);
        let last_seen = Utc::now();
        state
            .presence
            .insert(member.username, Presence::Offline { last_seen });
        Some(last_seen)
    }

    /// Point-in-time snapshot of a room's members, minus `exclude`.
    pub fn members_excluding(&self, room: &str, exclude: &str) -> Vec<Member> {
        self.rooms
            .get(room)
            .map(|state| {
                state
                    .members
                    .iter()
                    .filter(|m| m.username != exclude)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Point-in-time snapshot of all of a room's members.
    pub fn all_members(&self, room: &str) -> Vec<Member> {
        self.rooms
            .get(room)
            .map(|state| state.members.clone())
            .unwrap_or_default()
    }

    pub fn presence(&self, room: &str, username: &str) -> Option<Presence> {
        self.rooms
            .get(room)
            .and_then(|state| state.presence.get(username).copied())
    }

    /// (rooms, live connections) across the whole registry.
    pub fn counts(&self) -> (usize, usize) {
        let rooms = self.rooms.len();
        let connections = self.rooms.iter().map(|e| e.members.len()).sum();
        (rooms, connections)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
