//! Online sub-protocol handlers: the envelope itself, login, and room
//! membership.

use protocol::{Command, OnlineServerCommand, Packet};

use crate::auth::LoginOutcome;
use crate::room;
use crate::router::{Ctx, Handler};
use crate::store::{Filter, Record, RecordKind, RoomRecord, Store};

/// Unwraps the outer online command and re-dispatches the sub-packet
/// through the same router.
pub struct Envelope;

impl Handler for Envelope {
    fn name(&self) -> &'static str {
        "online-envelope"
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        match ctx.packet.nested("packet") {
            Some(inner) => ctx.core.route(ctx.conn, inner),
            None => log::debug!(
                "online envelope from {} carried no recognizable sub-packet",
                ctx.conn.addr
            ),
        }
        Ok(())
    }
}

pub struct Login;

impl Handler for Login {
    fn name(&self) -> &'static str {
        "login"
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let slot = (ctx.packet.int("player_number") as usize).min(1);
        let username = ctx.packet.str("username").to_string();
        let password = ctx.packet.str("password");

        match ctx
            .core
            .auth
            .login(ctx.core.store.as_ref(), &username, password)
        {
            LoginOutcome::Accepted(user_id) => {
                let current_room = {
                    let mut state = ctx.conn.lock();
                    state.slots[slot].user = Some(user_id);
                    state.slots[slot].name = username.clone();
                    state.room
                };
                log::info!("`{username}` logged in from {}", ctx.conn.addr);
                ctx.conn.send(login_reply(0, "login successful"));
                ctx.conn.send(room::chat_packet(ctx.core.options.motd.clone()));
                room::send_room_list(ctx.core, ctx.conn);
                if let Some(room_id) = current_room {
                    room::broadcast_user_list(ctx.core, room_id);
                }
            }
            LoginOutcome::Rejected(reason) => {
                // Rejection is an answer, not an error: the connection
                // stays open for another attempt.
                log::info!(
                    "login for `{username}` from {} rejected: {reason}",
                    ctx.conn.addr
                );
                ctx.conn.send(login_reply(1, &reason));
            }
        }
        Ok(())
    }
}

fn login_reply(status: u8, text: &str) -> Packet {
    room::online(Packet::new(
        Command::OnlineServer(OnlineServerCommand::Login),
        vec![("status", status.into()), ("text", text.into())],
    ))
}

pub struct EnterRoom;

impl Handler for EnterRoom {
    fn name(&self) -> &'static str {
        "enter-room"
    }

    fn require_login(&self) -> bool {
        true
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        if ctx.packet.int("enter") == 0 {
            let old = ctx.conn.lock().room.take();
            if let Some(room_id) = old {
                room::broadcast_user_list(ctx.core, room_id);
            }
            room::send_room_list(ctx.core, ctx.conn);
            return Ok(());
        }

        let name = ctx.packet.str("name");
        let Some(Record::Room(record)) = ctx
            .core
            .store
            .find(RecordKind::Room, &Filter::Name(name.to_string()))
        else {
            ctx.conn
                .send(room::chat_packet(format!("no room named `{name}`")));
            return Ok(());
        };
        if let Some(required) = &record.password {
            if ctx.packet.str("password") != required {
                ctx.conn.send(room::chat_packet("wrong room password"));
                return Ok(());
            }
        }
        if ctx.core.registry.room_members(record.id).len() >= record.max_players {
            ctx.conn.send(room::chat_packet("that room is full"));
            return Ok(());
        }
        enter_room(ctx, &record);
        Ok(())
    }
}

fn enter_room(ctx: &Ctx<'_>, record: &RoomRecord) {
    ctx.conn.lock().room = Some(record.id);
    ctx.conn.send(room::room_entry_packet(record));
    ctx.conn.send(room::room_info_packet(ctx.core, record));
    room::broadcast_user_list(ctx.core, record.id);
}

pub struct CreateRoom;

impl Handler for CreateRoom {
    fn name(&self) -> &'static str {
        "create-room"
    }

    fn require_login(&self) -> bool {
        true
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let title = ctx.packet.str("title").trim().to_string();
        if title.is_empty() {
            ctx.conn.send(room::chat_packet("a room needs a name"));
            return Ok(());
        }
        if ctx
            .core
            .store
            .find(RecordKind::Room, &Filter::Name(title.clone()))
            .is_some()
        {
            ctx.conn
                .send(room::chat_packet("a room with that name already exists"));
            return Ok(());
        }

        let password = ctx.packet.str("password");
        let record = RoomRecord {
            id: 0,
            name: title.clone(),
            description: ctx.packet.str("description").to_string(),
            kind: ctx.packet.int("kind") as u8,
            password: (!password.is_empty()).then(|| password.to_string()),
            status: room::RoomStatus::Open,
            active_song: None,
            max_players: 8,
        };
        let id = ctx.core.store.upsert(Record::Room(record.clone()));
        let record = RoomRecord { id, ..record };
        log::info!("room `{title}` created by {}", ctx.conn.addr);
        enter_room(ctx, &record);
        room::broadcast_room_list(ctx.core);
        Ok(())
    }
}

pub struct RoomInfo;

impl Handler for RoomInfo {
    fn name(&self) -> &'static str {
        "room-info"
    }

    fn require_login(&self) -> bool {
        true
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let name = ctx.packet.str("name");
        let record = if name.is_empty() {
            ctx.conn
                .lock()
                .room
                .and_then(|id| ctx.core.store.find(RecordKind::Room, &Filter::Id(id)))
        } else {
            ctx.core
                .store
                .find(RecordKind::Room, &Filter::Name(name.to_string()))
        };
        match record {
            Some(Record::Room(room_record)) => {
                ctx.conn
                    .send(room::room_info_packet(ctx.core, &room_record));
            }
            _ => ctx.conn.send(room::chat_packet("no such room")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, Outgoing};
    use crate::server::{testutil, ServerCore};
    use protocol::{ClientCommand, OnlineClientCommand, ServerCommand};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn send_online(core: &ServerCore, conn: &Arc<Connection>, inner: Packet) {
        let packet = Packet::envelope(Command::Client(ClientCommand::Online), inner);
        core.dispatch(conn, &packet);
    }

    /// Online replies with the given inner command, drained from the queue.
    fn online_replies(
        rx: &mut UnboundedReceiver<Outgoing>,
        command: OnlineServerCommand,
    ) -> Vec<Packet> {
        testutil::drain_command(rx, ServerCommand::Online)
            .into_iter()
            .filter_map(|packet| packet.nested("packet").cloned())
            .filter(|inner| inner.command() == Command::OnlineServer(command))
            .collect()
    }

    fn login_packet(name: &str, password: &str) -> Packet {
        Packet::new(
            Command::OnlineClient(OnlineClientCommand::Login),
            vec![
                ("player_number", 0u8.into()),
                ("username", name.into()),
                ("password", password.into()),
            ],
        )
    }

    fn create_room_packet(title: &str, password: &str) -> Packet {
        Packet::new(
            Command::OnlineClient(OnlineClientCommand::CreateRoom),
            vec![("title", title.into()), ("password", password.into())],
        )
    }

    fn enter_room_packet(name: &str, password: &str) -> Packet {
        Packet::new(
            Command::OnlineClient(OnlineClientCommand::EnterRoom),
            vec![
                ("enter", 1u8.into()),
                ("name", name.into()),
                ("password", password.into()),
            ],
        )
    }

    #[test]
    fn successful_login_binds_the_slot_and_replies() {
        let core = testutil::core();
        let (conn, mut rx) = testutil::client(&core);
        send_online(&core, &conn, login_packet("alice", "pw"));

        let replies = online_replies(&mut rx, OnlineServerCommand::Login);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].int("status"), 0);
        assert!(conn.lock().is_logged_in());
        assert_eq!(conn.lock().slots[0].name, "alice");
    }

    #[test]
    fn rejected_login_answers_but_keeps_the_connection() {
        let core = testutil::core();
        let (first, _r1) = testutil::client(&core);
        send_online(&core, &first, login_packet("alice", "pw"));

        let (conn, mut rx) = testutil::client(&core);
        send_online(&core, &conn, login_packet("alice", "wrong"));

        let replies = online_replies(&mut rx, OnlineServerCommand::Login);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].int("status"), 1);
        assert_eq!(replies[0].str("text"), "wrong password");
        assert!(!conn.lock().is_logged_in());
        assert!(!conn.is_closed());
    }

    #[test]
    fn create_room_enters_it_and_announces() {
        let core = testutil::core();
        let (conn, mut rx) = testutil::client(&core);
        testutil::login(&core, &conn, "alice");
        while rx.try_recv().is_ok() {}

        send_online(&core, &conn, create_room_packet("my room", ""));

        let entries = online_replies(&mut rx, OnlineServerCommand::RoomUpdate);
        assert!(entries.iter().any(|p| p.int("kind") == 0 && p.str("title") == "my room"));
        assert!(conn.lock().room.is_some());
    }

    #[test]
    fn wrong_room_password_is_refused() {
        let core = testutil::core();
        let (host, _rh) = testutil::client(&core);
        testutil::login(&core, &host, "host");
        send_online(&core, &host, create_room_packet("secret", "hunter2"));

        let (guest, mut rg) = testutil::client(&core);
        testutil::login(&core, &guest, "guest");
        while rg.try_recv().is_ok() {}

        send_online(&core, &guest, enter_room_packet("secret", "wrong"));
        assert!(guest.lock().room.is_none());
        let notes = testutil::drain_command(&mut rg, ServerCommand::Chat);
        assert!(notes.iter().any(|p| p.str("message").contains("password")));

        send_online(&core, &guest, enter_room_packet("secret", "hunter2"));
        assert_eq!(guest.lock().room, host.lock().room);
    }

    #[test]
    fn leaving_returns_to_the_lobby() {
        let core = testutil::core();
        let (conn, mut rx) = testutil::client(&core);
        testutil::login(&core, &conn, "alice");
        send_online(&core, &conn, create_room_packet("my room", ""));
        while rx.try_recv().is_ok() {}

        let leave = Packet::new(
            Command::OnlineClient(OnlineClientCommand::EnterRoom),
            vec![("enter", 0u8.into())],
        );
        send_online(&core, &conn, leave);
        assert!(conn.lock().room.is_none());
        // The lobby room list comes back.
        assert!(!online_replies(&mut rx, OnlineServerCommand::RoomUpdate).is_empty());
    }

    #[test]
    fn room_info_names_the_members() {
        let core = testutil::core();
        let (conn, mut rx) = testutil::client(&core);
        testutil::login(&core, &conn, "alice");
        send_online(&core, &conn, create_room_packet("my room", ""));
        while rx.try_recv().is_ok() {}

        let request = Packet::empty(Command::OnlineClient(OnlineClientCommand::RoomInfo));
        send_online(&core, &conn, request);
        let infos = online_replies(&mut rx, OnlineServerCommand::RoomInfo);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].get("players").unwrap().as_str_list(), ["alice"]);
    }

    #[test]
    fn room_list_broadcast_targets_the_lobby_screen() {
        let core = testutil::core();
        let (lobby, mut rl) = testutil::client(&core);
        testutil::login(&core, &lobby, "lobby");
        let screen = Packet::new(
            Command::Client(ClientCommand::ScreenChange),
            vec![("status", 1u8.into())],
        );
        core.dispatch(&lobby, &screen);
        let (elsewhere, mut re) = testutil::client(&core);
        testutil::login(&core, &elsewhere, "elsewhere");
        while rl.try_recv().is_ok() {}
        while re.try_recv().is_ok() {}

        let (host, _rh) = testutil::client(&core);
        testutil::login(&core, &host, "host");
        send_online(&core, &host, create_room_packet("fresh room", ""));

        let lists = online_replies(&mut rl, OnlineServerCommand::RoomUpdate);
        assert!(lists.iter().any(|p| p.int("kind") == 1));
        assert!(online_replies(&mut re, OnlineServerCommand::RoomUpdate).is_empty());
    }

    #[test]
    fn duplicate_room_names_are_refused() {
        let core = testutil::core();
        let (conn, mut rx) = testutil::client(&core);
        testutil::login(&core, &conn, "alice");
        send_online(&core, &conn, create_room_packet("my room", ""));
        let first_room = conn.lock().room;
        while rx.try_recv().is_ok() {}

        send_online(&core, &conn, create_room_packet("my room", ""));
        assert_eq!(conn.lock().room, first_room);
        let notes = testutil::drain_command(&mut rx, ServerCommand::Chat);
        assert!(notes.iter().any(|p| p.str("message").contains("already exists")));
    }
}
