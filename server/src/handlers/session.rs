//! Session-level handlers: keepalive, the hello exchange, and client
//! bookkeeping that needs no room.

use protocol::{Command, Packet, ServerCommand, PROTOCOL_VERSION};

use crate::room;
use crate::router::{Ctx, Handler};

pub struct Ping;

impl Handler for Ping {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        ctx.conn
            .send(Packet::empty(Command::Server(ServerCommand::PingResponse)));
        Ok(())
    }
}

/// The reply to our own keepalive ping. Dispatch already refreshed the
/// idle clock; nothing else to do.
pub struct PingAck;

impl Handler for PingAck {
    fn name(&self) -> &'static str {
        "ping-ack"
    }

    fn handle(&self, _ctx: &Ctx<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct Hello;

impl Handler for Hello {
    fn name(&self) -> &'static str {
        "hello"
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let version = ctx.packet.int("version") as u8;
        let name = ctx.packet.str("name").to_string();
        log::info!(
            "hello from {}: client `{}` protocol {}",
            ctx.conn.addr,
            name,
            version
        );
        {
            let mut state = ctx.conn.lock();
            state.client_version = version;
            state.client_name = name;
        }
        ctx.conn.send(Packet::new(
            Command::Server(ServerCommand::Hello),
            vec![
                ("version", PROTOCOL_VERSION.into()),
                ("name", ctx.core.options.name.as_str().into()),
                ("key", rand::random::<u32>().into()),
            ],
        ));
        Ok(())
    }
}

pub struct ScreenChange;

impl Handler for ScreenChange {
    fn name(&self) -> &'static str {
        "screen-change"
    }

    fn require_login(&self) -> bool {
        true
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        // Status 1 is the network lobby; everything else leaves it.
        let in_lobby = ctx.packet.int("status") == 1;
        ctx.conn.lock().screen_in_lobby = in_lobby;
        if in_lobby {
            room::send_room_list(ctx.core, ctx.conn);
        }
        Ok(())
    }
}

pub struct StyleUpdate;

impl Handler for StyleUpdate {
    fn name(&self) -> &'static str {
        "style-update"
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let count = (ctx.packet.int("player_count") as usize).clamp(1, 2);
        let slot = (ctx.packet.int("player_id") as usize).min(1);
        let name = ctx.packet.str("player_name").to_string();
        let mut state = ctx.conn.lock();
        state.active_players = count;
        if !name.is_empty() {
            state.slots[slot].name = name;
        }
        Ok(())
    }
}

/// Modifier strings are informational; remember them for operators who ask.
pub struct PlayerOptions;

impl Handler for PlayerOptions {
    fn name(&self) -> &'static str {
        "player-options"
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        log::debug!(
            "{} options: p0 `{}` p1 `{}`",
            ctx.conn.addr,
            ctx.packet.str("player_0"),
            ctx.packet.str("player_1")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testutil;
    use protocol::ClientCommand;

    #[test]
    fn hello_answers_with_server_identity() {
        let core = testutil::core();
        let (conn, mut rx) = testutil::client(&core);
        let packet = Packet::new(
            Command::Client(ClientCommand::Hello),
            vec![("version", 128u8.into()), ("name", "StepMania".into())],
        );
        core.dispatch(&conn, &packet);

        let reply = testutil::next_packet(&mut rx);
        assert_eq!(reply.command(), Command::Server(ServerCommand::Hello));
        assert_eq!(reply.int("version"), PROTOCOL_VERSION as u64);
        assert_eq!(reply.str("name"), core.options.name);
        assert_eq!(conn.lock().client_name, "StepMania");
    }

    #[test]
    fn ping_is_answered_without_login() {
        let core = testutil::core();
        let (conn, mut rx) = testutil::client(&core);
        core.dispatch(&conn, &Packet::empty(Command::Client(ClientCommand::Ping)));
        let reply = testutil::next_packet(&mut rx);
        assert_eq!(reply.command(), Command::Server(ServerCommand::PingResponse));
    }

    #[test]
    fn entering_the_lobby_screen_delivers_the_room_list() {
        let core = testutil::core();
        let (conn, mut rx) = testutil::client(&core);
        testutil::login(&core, &conn, "alice");
        let _ = testutil::drain_command(&mut rx, ServerCommand::Online);

        let packet = Packet::new(
            Command::Client(ClientCommand::ScreenChange),
            vec![("status", 1u8.into())],
        );
        core.dispatch(&conn, &packet);
        let updates = testutil::drain_command(&mut rx, ServerCommand::Online);
        assert!(!updates.is_empty());
        assert!(conn.lock().screen_in_lobby);
    }

    #[test]
    fn style_update_names_the_second_slot() {
        let core = testutil::core();
        let (conn, _rx) = testutil::client(&core);
        let packet = Packet::new(
            Command::Client(ClientCommand::StyleUpdate),
            vec![
                ("player_count", 2u8.into()),
                ("player_id", 1u8.into()),
                ("player_name", "beth".into()),
            ],
        );
        core.dispatch(&conn, &packet);
        let state = conn.lock();
        assert_eq!(state.active_players, 2);
        assert_eq!(state.slots[1].name, "beth");
    }
}
