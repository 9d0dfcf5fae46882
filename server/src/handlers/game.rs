//! Gameplay handlers: song selection, the start barrier, score updates,
//! and end-of-round results.

use protocol::{Command, Packet, ServerCommand, Value};

use crate::connection::SongAvailability;
use crate::room::{self, RoomStatus};
use crate::router::{Ctx, Handler};
use crate::store::{Filter, Record, RecordKind, SongRecord, Store};
use crate::watcher;

/// Client-side `usage` codes for the song request command.
mod usage {
    /// Propose this song to the room.
    pub const PROPOSE: u64 = 0;
    /// The sender has the proposed song.
    pub const HAS: u64 = 1;
    /// The sender is missing the proposed song.
    pub const MISSING: u64 = 2;
    /// Commit the room to playing the proposed song.
    pub const START: u64 = 3;
}

/// Server-side `usage` codes: 0 asks members whether they have the song,
/// 1 tells them to load it.
mod server_usage {
    pub const QUERY: u64 = 0;
    pub const LOAD: u64 = 1;
}

pub struct SongRequest;

impl Handler for SongRequest {
    fn name(&self) -> &'static str {
        "song-request"
    }

    fn require_login(&self) -> bool {
        true
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let Some(room_id) = ctx.conn.lock().room else {
            ctx.conn
                .send(room::chat_packet("you are not in a room"));
            return Ok(());
        };
        let Some(Record::Room(mut record)) =
            ctx.core.store.find(RecordKind::Room, &Filter::Id(room_id))
        else {
            anyhow::bail!("connection {} is in room {room_id} which has no record", ctx.conn.token);
        };

        match ctx.packet.int("usage") {
            usage::PROPOSE => {
                if !matches!(record.status, RoomStatus::Open | RoomStatus::SongSelected) {
                    ctx.conn
                        .send(room::chat_packet("a song is already being played"));
                    return Ok(());
                }
                let song_id = find_or_create_song(ctx, ctx.packet)?;
                record.active_song = Some(song_id);
                record.status = RoomStatus::SongSelected;
                ctx.core.store.upsert(Record::Room(record));

                ctx.conn.lock().songs.insert(song_id, SongAvailability::Has);
                let query = Packet::new(
                    Command::Server(ServerCommand::SongRequest),
                    vec![
                        ("usage", server_usage::QUERY.into()),
                        ("title", ctx.packet.str("title").into()),
                        ("subtitle", ctx.packet.str("subtitle").into()),
                        ("artist", ctx.packet.str("artist").into()),
                    ],
                );
                for member in ctx.core.registry.room_members(room_id) {
                    if member.token != ctx.conn.token {
                        member.send(query.clone());
                    }
                }
            }
            usage::HAS => {
                if let Some(song_id) = record.active_song {
                    ctx.conn.lock().songs.insert(song_id, SongAvailability::Has);
                }
            }
            usage::MISSING => {
                if let Some(song_id) = record.active_song {
                    ctx.conn
                        .lock()
                        .songs
                        .insert(song_id, SongAvailability::Missing);
                    log::info!(
                        "{} is missing the selected song in room `{}`",
                        ctx.conn.addr,
                        record.name
                    );
                }
            }
            usage::START => {
                let Some(song_id) = record.active_song else {
                    ctx.conn.send(room::chat_packet("no song has been proposed"));
                    return Ok(());
                };
                if let Some(Record::Song(mut song)) =
                    ctx.core.store.find(RecordKind::Song, &Filter::Id(song_id))
                {
                    song.plays += 1;
                    let load = Packet::new(
                        Command::Server(ServerCommand::SongRequest),
                        vec![
                            ("usage", server_usage::LOAD.into()),
                            ("title", song.title.as_str().into()),
                            ("subtitle", song.subtitle.as_str().into()),
                            ("artist", song.artist.as_str().into()),
                        ],
                    );
                    ctx.core.store.upsert(Record::Song(song));
                    ctx.core.registry.send_to_room(room_id, &load);
                }
            }
            other => {
                log::debug!("unknown song request usage {other} from {}", ctx.conn.addr);
            }
        }
        Ok(())
    }
}

fn find_or_create_song(ctx: &Ctx<'_>, packet: &Packet) -> anyhow::Result<u32> {
    let key = Filter::SongKey {
        title: packet.str("title").to_string(),
        subtitle: packet.str("subtitle").to_string(),
        artist: packet.str("artist").to_string(),
    };
    if let Some(Record::Song(song)) = ctx.core.store.find(RecordKind::Song, &key) {
        return Ok(song.id);
    }
    Ok(ctx.core.store.upsert(Record::Song(SongRecord {
        id: 0,
        title: packet.str("title").to_string(),
        subtitle: packet.str("subtitle").to_string(),
        artist: packet.str("artist").to_string(),
        plays: 0,
    })))
}

pub struct GameStart;

impl Handler for GameStart {
    fn name(&self) -> &'static str {
        "game-start"
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let room_id = {
            let mut state = ctx.conn.lock();
            let active = state.active_players;
            for (slot, prefix) in (0..active).zip(["primary", "secondary"]) {
                state.slots[slot].feet = ctx.packet.int(&format!("{prefix}_feet")) as u8;
                state.slots[slot].difficulty =
                    ctx.packet.int(&format!("{prefix}_difficulty")) as u8;
                state.slots[slot].reset_round();
            }
            state.room
        };

        let Some(room_id) = room_id else {
            // Solo play: nothing to synchronize with.
            ctx.conn
                .send(Packet::empty(Command::Server(ServerCommand::GameStart)));
            ctx.conn.lock().ingame = true;
            return Ok(());
        };

        let Some(Record::Room(mut record)) =
            ctx.core.store.find(RecordKind::Room, &Filter::Id(room_id))
        else {
            anyhow::bail!("connection {} is in room {room_id} which has no record", ctx.conn.token);
        };
        let Some(song_id) = record.active_song else {
            ctx.conn.send(room::chat_packet("no song has been selected"));
            return Ok(());
        };

        {
            let mut state = ctx.conn.lock();
            state.songs.insert(song_id, SongAvailability::Has);
            if !state.wait_start {
                state.wait_start = true;
                state.wait_start_since = Some(std::time::Instant::now());
            }
        }
        if record.status == RoomStatus::SongSelected {
            record.status = RoomStatus::WaitingToStart;
            ctx.core.store.upsert(Record::Room(record));
        }
        room::broadcast_user_list(ctx.core, room_id);

        // The all-ready case starts here, not on the next watcher tick.
        watcher::check_song_start(ctx.core);
        Ok(())
    }
}

pub struct StatusUpdate;

impl Handler for StatusUpdate {
    fn name(&self) -> &'static str {
        "status-update"
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let slot = (ctx.packet.int("player_id") as usize).min(1);
        let score = ctx.packet.int("score") as u32;
        let combo = ctx.packet.int("combo") as u16;
        let health = ctx.packet.int("health") as u16;
        let grade = ctx.packet.int("projected_grade") as u8;
        ctx.conn.lock().slots[slot]
            .score
            .apply(score, combo, health, grade);
        Ok(())
    }
}

pub struct GameOver;

impl Handler for GameOver {
    fn name(&self) -> &'static str {
        "game-over"
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let room_id = {
            let mut state = ctx.conn.lock();
            state.ingame = false;
            state.wait_start = false;
            state.wait_start_since = None;
            state.room
        };
        let Some(room_id) = room_id else {
            return Ok(());
        };
        let Some(Record::Room(mut record)) =
            ctx.core.store.find(RecordKind::Room, &Filter::Id(room_id))
        else {
            return Ok(());
        };
        if record.status != RoomStatus::InGame {
            return Ok(());
        }

        let members = ctx.core.registry.room_members(room_id);
        // Results wait for the last player still in the song.
        if members.iter().any(|conn| conn.lock().ingame) {
            room::broadcast_user_list(ctx.core, room_id);
            return Ok(());
        }

        let mut standings: Vec<(String, u32, u16, u8)> = Vec::new();
        for member in &members {
            let state = member.lock();
            for slot in state.logged_slots() {
                if slot.score.notes > 0 {
                    standings.push((
                        slot.name.clone(),
                        slot.score.score,
                        slot.score.max_combo,
                        slot.score.grade,
                    ));
                }
            }
        }
        standings.sort_by(|a, b| b.1.cmp(&a.1));

        let results = Packet::new(
            Command::Server(ServerCommand::GameOver),
            vec![
                ("player_count", (standings.len() as u64).into()),
                (
                    "placements",
                    Value::IntList((0..standings.len() as u64).collect()),
                ),
                (
                    "scores",
                    Value::IntList(standings.iter().map(|s| s.1 as u64).collect()),
                ),
                (
                    "combos",
                    Value::IntList(standings.iter().map(|s| s.2 as u64).collect()),
                ),
                (
                    "grades",
                    Value::IntList(standings.iter().map(|s| s.3 as u64).collect()),
                ),
                (
                    "names",
                    Value::StrList(standings.iter().map(|s| s.0.clone()).collect()),
                ),
            ],
        );
        for member in &members {
            member.send(results.clone());
            let mut state = member.lock();
            for slot in state.slots.iter_mut() {
                slot.reset_round();
            }
        }

        record.status = RoomStatus::Open;
        record.active_song = None;
        ctx.core.store.upsert(Record::Room(record));

        room::broadcast_user_list(ctx.core, room_id);
        room::broadcast_room_list(ctx.core);
        Ok(())
    }
}
