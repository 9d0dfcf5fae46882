//! Per-connection session state shared by every transport.
//!
//! A [`Connection`] is created by the transport that accepted the client and
//! lives until teardown. Transports own the I/O; everything else talks to
//! the connection through its outbound queue and its mutable session state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use protocol::Packet;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use crate::store::{RoomId, SongId, UserId};

/// An item on a connection's outbound queue, consumed by that connection's
/// writer task.
#[derive(Debug)]
pub enum Outgoing {
    Packet(Packet),
    /// Flush and close. Queued exactly once, by teardown.
    Shutdown,
}

/// Whether a connection has told us it has the active song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SongAvailability {
    /// No report either way.
    #[default]
    Unknown,
    Has,
    Missing,
}

/// Running score for one local player during a round.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreState {
    pub score: u32,
    pub combo: u16,
    pub max_combo: u16,
    pub health: u16,
    pub grade: u8,
    /// Number of judged steps reported so far.
    pub notes: u32,
}

impl ScoreState {
    pub fn apply(&mut self, score: u32, combo: u16, health: u16, grade: u8) {
        self.score = score;
        self.combo = combo;
        self.max_combo = self.max_combo.max(combo);
        self.health = health;
        self.grade = grade;
        self.notes += 1;
    }
}

/// One of the up to two local players a client can field.
#[derive(Debug, Clone, Default)]
pub struct PlayerSlot {
    pub user: Option<UserId>,
    pub name: String,
    pub difficulty: u8,
    pub feet: u8,
    pub score: ScoreState,
}

impl PlayerSlot {
    pub fn reset_round(&mut self) {
        self.score = ScoreState::default();
    }
}

/// Mutable session state, guarded by the connection's mutex. Held only for
/// short synchronous sections; never across an await point.
#[derive(Debug)]
pub struct ConnState {
    /// Client software name from the hello exchange.
    pub client_name: String,
    pub client_version: u8,
    /// Number of local players the client currently fields (1 or 2).
    pub active_players: usize,
    pub slots: [PlayerSlot; 2],
    pub room: Option<RoomId>,
    /// Availability reports for songs proposed while this client was in
    /// the room.
    pub songs: std::collections::HashMap<SongId, SongAvailability>,
    /// Set when the client has loaded the song and is parked at the
    /// barrier.
    pub wait_start: bool,
    pub wait_start_since: Option<Instant>,
    pub ingame: bool,
    pub screen_in_lobby: bool,
    pub last_seen: Instant,
}

impl ConnState {
    fn new() -> Self {
        Self {
            client_name: String::new(),
            client_version: 0,
            active_players: 1,
            slots: [PlayerSlot::default(), PlayerSlot::default()],
            room: None,
            songs: std::collections::HashMap::new(),
            wait_start: false,
            wait_start_since: None,
            ingame: false,
            screen_in_lobby: false,
            last_seen: Instant::now(),
        }
    }

    /// Slots with a logged-in user bound to them.
    pub fn logged_slots(&self) -> impl Iterator<Item = &PlayerSlot> {
        self.slots.iter().filter(|slot| slot.user.is_some())
    }

    pub fn is_logged_in(&self) -> bool {
        self.slots.iter().any(|slot| slot.user.is_some())
    }

    pub fn availability(&self, song: SongId) -> SongAvailability {
        self.songs.get(&song).copied().unwrap_or_default()
    }

    /// Display name for chat and standings: the first logged-in slot,
    /// falling back to the hello name.
    pub fn display_name(&self) -> &str {
        match self.logged_slots().next() {
            Some(slot) => &slot.name,
            None => &self.client_name,
        }
    }
}

/// A live client session. Cheaply cloneable via `Arc`; the transport that
/// created it drives I/O, while handlers and the watcher reach it through
/// the registry.
pub struct Connection {
    pub token: u64,
    pub addr: SocketAddr,
    outgoing: UnboundedSender<Outgoing>,
    /// Signals the transport read loop to stop.
    pub shutdown: Notify,
    closed: AtomicBool,
    /// WebSocket wire preference: mirrors the form of the last packet
    /// received. Meaningless on the byte-stream transports.
    json_wire: AtomicBool,
    state: Mutex<ConnState>,
}

impl Connection {
    /// Builds a connection and the receiver half of its outbound queue.
    pub fn channel(token: u64, addr: SocketAddr) -> (std::sync::Arc<Self>, UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = std::sync::Arc::new(Self {
            token,
            addr,
            outgoing: tx,
            shutdown: Notify::new(),
            closed: AtomicBool::new(false),
            json_wire: AtomicBool::new(false),
            state: Mutex::new(ConnState::new()),
        });
        (conn, rx)
    }

    /// Locks the session state. A poisoned lock yields the inner state
    /// unchanged; handlers stage their storage writes separately, so a
    /// panicking handler cannot leave the guard unusable.
    pub fn lock(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a packet for delivery. Packets queued after teardown are
    /// silently dropped.
    pub fn send(&self, packet: Packet) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.outgoing.send(Outgoing::Packet(packet));
    }

    /// First phase of teardown. Returns `true` exactly once; the caller
    /// that wins proceeds with deregistration and broadcasts.
    pub fn begin_close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.outgoing.send(Outgoing::Shutdown);
        self.shutdown.notify_one();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn touch(&self) {
        self.lock().last_seen = Instant::now();
    }

    pub fn set_json_wire(&self, json: bool) {
        self.json_wire.store(json, Ordering::Relaxed);
    }

    pub fn json_wire(&self) -> bool {
        self.json_wire.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("token", &self.token)
            .field("addr", &self.addr)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
