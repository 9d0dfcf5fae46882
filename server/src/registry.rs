//! Roster of live connections, shared by transports, handlers, and the
//! watcher. Enforces the server capacity limit and provides the broadcast
//! primitives everything else builds on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use protocol::Packet;

use crate::connection::Connection;
use crate::store::RoomId;

pub struct Registry {
    capacity: usize,
    next_token: AtomicU64,
    connections: Mutex<HashMap<u64, Arc<Connection>>>,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_token: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Hands out the token for the next accepted connection.
    pub fn issue_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds a connection to the roster. Fails when the server is full;
    /// the transport rejects the client in that case.
    pub fn add(&self, conn: Arc<Connection>) -> bool {
        let mut map = self.guard();
        if map.len() >= self.capacity {
            return false;
        }
        map.insert(conn.token, conn);
        true
    }

    pub fn remove(&self, token: u64) -> Option<Arc<Connection>> {
        self.guard().remove(&token)
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// A point-in-time copy of the roster. Iteration never holds the
    /// roster lock, so handlers may register or remove connections while
    /// a broadcast walks the snapshot.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.guard().values().cloned().collect()
    }

    /// Connections currently inside the given room.
    pub fn room_members(&self, room: RoomId) -> Vec<Arc<Connection>> {
        self.snapshot()
            .into_iter()
            .filter(|conn| conn.lock().room == Some(room))
            .collect()
    }

    pub fn send_to_all(&self, packet: &Packet) {
        for conn in self.snapshot() {
            conn.send(packet.clone());
        }
    }

    pub fn send_to_room(&self, room: RoomId, packet: &Packet) {
        for conn in self.room_members(room) {
            conn.send(packet.clone());
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
