//! Periodic maintenance: releases the song-start barrier and reaps idle
//! connections.
//!
//! The barrier check also runs inline whenever a player reports ready, so
//! the common all-ready case starts without waiting for the next tick; the
//! periodic sweep exists for the forced-start timeout and for players that
//! go quiet at the barrier.

use std::sync::Arc;
use std::time::Duration;

use protocol::{Command, Packet, ServerCommand};

use crate::connection::{Connection, SongAvailability};
use crate::server::ServerCore;
use crate::store::{Filter, Record, RecordKind, RoomId, Store};
use crate::room::{self, RoomStatus};

/// How long one ready player may be held at the barrier before the round
/// is started without the stragglers.
pub const START_GRACE: Duration = Duration::from_secs(3);

/// Connections silent for this long are dropped.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn run(core: Arc<ServerCore>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        tick_once(&core);
    }
}

pub fn tick_once(core: &ServerCore) {
    let _guard = core.dispatch_guard();
    check_song_start(core);
    check_idle(core);
}

/// Releases the barrier for every room where the start condition holds:
/// all participants ready, or any participant waiting past the grace
/// period. Participants are the members that reported having the song.
pub fn check_song_start(core: &ServerCore) {
    let snapshot = core.registry.snapshot();
    let mut room_ids: Vec<RoomId> = Vec::new();
    for conn in &snapshot {
        if let Some(id) = conn.lock().room {
            if !room_ids.contains(&id) {
                room_ids.push(id);
            }
        }
    }

    for room_id in room_ids {
        let Some(Record::Room(mut record)) =
            core.store.find(RecordKind::Room, &Filter::Id(room_id))
        else {
            continue;
        };
        if !matches!(
            record.status,
            RoomStatus::SongSelected | RoomStatus::WaitingToStart
        ) {
            continue;
        }
        let Some(song) = record.active_song else {
            continue;
        };

        let mut participants: Vec<Arc<Connection>> = Vec::new();
        let mut all_ready = true;
        let mut overdue = false;
        for conn in &snapshot {
            let state = conn.lock();
            if state.room != Some(room_id) || state.availability(song) != SongAvailability::Has {
                continue;
            }
            if state.wait_start {
                if let Some(since) = state.wait_start_since {
                    if since.elapsed() > START_GRACE {
                        overdue = true;
                    }
                }
            } else {
                all_ready = false;
            }
            drop(state);
            participants.push(conn.clone());
        }

        if participants.is_empty() || !(all_ready || overdue) {
            continue;
        }
        if !all_ready {
            log::warn!(
                "room `{}` forced to start after the grace period",
                record.name
            );
        } else {
            log::info!("room `{}` starting with {} player(s)", record.name, participants.len());
        }

        for conn in &participants {
            {
                let mut state = conn.lock();
                state.ingame = true;
                state.wait_start = false;
                state.wait_start_since = None;
            }
            conn.send(Packet::empty(Command::Server(ServerCommand::GameStart)));
        }
        record.status = RoomStatus::InGame;
        core.store.upsert(Record::Room(record));
        core.store.commit();
        room::broadcast_user_list(core, room_id);
    }
}

/// Drops connections past the idle timeout and pings the ones halfway
/// there.
pub fn check_idle(core: &ServerCore) {
    for conn in core.registry.snapshot() {
        let idle = conn.lock().last_seen.elapsed();
        if idle > IDLE_TIMEOUT {
            log::warn!("dropping {} after {:?} of silence", conn.addr, idle);
            core.disconnect(&conn);
        } else if idle > IDLE_TIMEOUT / 2 {
            conn.send(Packet::empty(Command::Server(ServerCommand::Ping)));
        }
    }
}
