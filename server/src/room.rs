//! Room lifecycle and the broadcast packets that describe it.
//!
//! A room moves `Open` -> `SongSelected` -> `WaitingToStart` -> `InGame`
//! and back to `Open` when results go out. The builders here produce the
//! room list, room entry, user list, and room info packets sent in
//! response to those transitions.

use std::sync::Arc;

use protocol::{Command, OnlineServerCommand, Packet, Row, ServerCommand, Value};

use crate::connection::Connection;
use crate::server::ServerCore;
use crate::store::{Filter, Record, RecordKind, RoomId, RoomRecord, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// Accepting players, no song chosen.
    Open,
    /// A song was proposed; players are reporting availability.
    SongSelected,
    /// At least one player is parked at the start barrier.
    WaitingToStart,
    InGame,
}

impl RoomStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            RoomStatus::Open => 0,
            RoomStatus::SongSelected => 1,
            RoomStatus::WaitingToStart => 2,
            RoomStatus::InGame => 3,
        }
    }
}

/// Wraps an online sub-packet in the server-side envelope.
pub fn online(inner: Packet) -> Packet {
    Packet::envelope(Command::Server(ServerCommand::Online), inner)
}

pub fn chat_packet(text: impl Into<String>) -> Packet {
    Packet::new(
        Command::Server(ServerCommand::Chat),
        vec![("message", Value::Str(text.into()))],
    )
}

/// Announces the room a client just entered.
pub fn room_entry_packet(room: &RoomRecord) -> Packet {
    online(Packet::new(
        Command::OnlineServer(OnlineServerCommand::RoomUpdate),
        vec![
            ("kind", 0u8.into()),
            ("title", room.name.as_str().into()),
            ("description", room.description.as_str().into()),
            ("room_kind", room.kind.into()),
        ],
    ))
}

/// The full room list, sent to lobby clients.
pub fn room_list_packet(rooms: &[RoomRecord]) -> Packet {
    let names: Vec<String> = rooms.iter().map(|r| r.name.clone()).collect();
    let descriptions: Vec<String> = rooms.iter().map(|r| r.description.clone()).collect();
    let statuses: Vec<u64> = rooms.iter().map(|r| r.status.as_byte() as u64).collect();
    let flags: Vec<u64> = rooms
        .iter()
        .map(|r| u64::from(r.password.is_some()))
        .collect();
    online(Packet::new(
        Command::OnlineServer(OnlineServerCommand::RoomUpdate),
        vec![
            ("kind", 1u8.into()),
            ("room_count", (rooms.len() as u64).into()),
            ("names", names.into()),
            ("descriptions", descriptions.into()),
            ("statuses", statuses.into()),
            ("flags", flags.into()),
        ],
    ))
}

pub fn general_info_packet() -> Packet {
    online(Packet::new(
        Command::OnlineServer(OnlineServerCommand::GeneralInfo),
        vec![("format", 1u8.into())],
    ))
}

/// Current song and player names for one room.
pub fn room_info_packet(core: &ServerCore, room: &RoomRecord) -> Packet {
    let song = room
        .active_song
        .and_then(|id| core.store.find(RecordKind::Song, &Filter::Id(id)));
    let (title, subtitle, artist) = match song {
        Some(Record::Song(s)) => (s.title, s.subtitle, s.artist),
        _ => (String::new(), String::new(), String::new()),
    };
    let players: Vec<String> = core
        .registry
        .room_members(room.id)
        .iter()
        .flat_map(|conn| {
            conn.lock()
                .logged_slots()
                .map(|slot| slot.name.clone())
                .collect::<Vec<_>>()
        })
        .collect();
    online(Packet::new(
        Command::OnlineServer(OnlineServerCommand::RoomInfo),
        vec![
            ("song_title", title.into()),
            ("song_subtitle", subtitle.into()),
            ("song_artist", artist.into()),
            ("player_count", (players.len() as u64).into()),
            ("max_players", (room.max_players as u64).into()),
            ("players", players.into()),
        ],
    ))
}

/// Player roster for one room. Status bytes: 0 in lobby, 1 at the start
/// barrier, 2 playing.
pub fn user_list_packet(max_players: usize, members: &[Arc<Connection>]) -> Packet {
    let mut rows: Vec<Row> = Vec::new();
    for conn in members {
        let state = conn.lock();
        let status: u8 = if state.ingame {
            2
        } else if state.wait_start {
            1
        } else {
            0
        };
        for slot in state.logged_slots() {
            rows.push(vec![
                ("status".to_string(), status.into()),
                ("name".to_string(), slot.name.as_str().into()),
            ]);
        }
    }
    Packet::new(
        Command::Server(ServerCommand::UserList),
        vec![
            ("max_players", (max_players as u64).into()),
            ("player_count", (rows.len() as u64).into()),
            ("players", Value::Records(rows)),
        ],
    )
}

pub fn broadcast_user_list(core: &ServerCore, room_id: RoomId) {
    let Some(Record::Room(room)) = core.store.find(RecordKind::Room, &Filter::Id(room_id)) else {
        return;
    };
    let members = core.registry.room_members(room_id);
    let packet = user_list_packet(room.max_players, &members);
    for conn in &members {
        conn.send(packet.clone());
    }
}

fn all_rooms(core: &ServerCore) -> Vec<RoomRecord> {
    core.store
        .list(RecordKind::Room)
        .into_iter()
        .filter_map(|record| match record {
            Record::Room(room) => Some(room),
            _ => None,
        })
        .collect()
}

/// Sends the room list and general info to one connection.
pub fn send_room_list(core: &ServerCore, conn: &Connection) {
    let rooms = all_rooms(core);
    conn.send(room_list_packet(&rooms));
    conn.send(general_info_packet());
}

/// Refreshes the room list for every logged-in connection watching the
/// lobby screen. Clients on other screens request the list themselves
/// when they come back.
pub fn broadcast_room_list(core: &ServerCore) {
    let rooms = all_rooms(core);
    let packet = room_list_packet(&rooms);
    for conn in core.registry.snapshot() {
        let in_lobby = {
            let state = conn.lock();
            state.room.is_none() && state.is_logged_in() && state.screen_in_lobby
        };
        if in_lobby {
            conn.send(packet.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(name: &str, status: RoomStatus, password: Option<&str>) -> RoomRecord {
        RoomRecord {
            id: 0,
            name: name.into(),
            description: format!("{name} desc"),
            kind: 0,
            password: password.map(str::to_string),
            status,
            active_song: None,
            max_players: 8,
        }
    }

    #[test]
    fn room_list_carries_parallel_columns() {
        let rooms = vec![
            room("alpha", RoomStatus::Open, None),
            room("beta", RoomStatus::InGame, Some("pw")),
        ];
        let packet = room_list_packet(&rooms);
        let inner = packet.nested("packet").expect("envelope payload");
        assert_eq!(inner.int("kind"), 1);
        assert_eq!(inner.int("room_count"), 2);
        assert_eq!(inner.get("names").unwrap().as_str_list(), ["alpha", "beta"]);
        assert_eq!(inner.get("statuses").unwrap().as_int_list(), [0, 3]);
        assert_eq!(inner.get("flags").unwrap().as_int_list(), [0, 1]);
    }

    #[test]
    fn user_list_reflects_barrier_and_play_state() {
        let (a, _ra) = Connection::channel(1, "127.0.0.1:1001".parse().unwrap());
        let (b, _rb) = Connection::channel(2, "127.0.0.1:1002".parse().unwrap());
        {
            let mut state = a.lock();
            state.slots[0].user = Some(1);
            state.slots[0].name = "alice".into();
            state.wait_start = true;
        }
        {
            let mut state = b.lock();
            state.slots[0].user = Some(2);
            state.slots[0].name = "bob".into();
            state.slots[1].user = Some(3);
            state.slots[1].name = "beth".into();
            state.ingame = true;
        }

        let packet = user_list_packet(8, &[a, b]);
        assert_eq!(packet.int("player_count"), 3);
        match packet.get("players") {
            Some(Value::Records(rows)) => {
                assert_eq!(rows.len(), 3);
                assert_eq!(rows[0][0].1.as_int(), 1);
                assert_eq!(rows[0][1].1.as_str(), "alice");
                assert_eq!(rows[1][0].1.as_int(), 2);
                assert_eq!(rows[2][1].1.as_str(), "beth");
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn room_entry_packet_round_trips_on_the_wire() {
        let record = room("alpha", RoomStatus::Open, None);
        let packet = room_entry_packet(&record);
        let frame = packet.frame();
        let parsed = Packet::parse(protocol::CommandScope::Server, &frame[4..])
            .expect("well-formed")
            .expect("known command");
        let inner = parsed.nested("packet").expect("envelope payload");
        assert_eq!(inner.int("kind"), 0);
        assert_eq!(inner.str("title"), "alpha");
    }
}
