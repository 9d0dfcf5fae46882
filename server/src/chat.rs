//! Slash-command registry for chat.
//!
//! A chat line starting with `/` is resolved against registered commands
//! instead of being relayed. Commands return reply lines sent only to the
//! invoking connection.

use crate::connection::Connection;
use crate::router::Ctx;

pub trait ChatCommand: Send + Sync {
    fn name(&self) -> &'static str;
    fn help(&self) -> &'static str;

    /// Per-connection availability; unavailable commands are hidden from
    /// `/help` and refused on use.
    fn available(&self, _conn: &Connection) -> bool {
        true
    }

    fn run(&self, ctx: &Ctx<'_>, args: &str) -> Vec<String>;
}

pub struct ChatCommands {
    commands: Vec<Box<dyn ChatCommand>>,
}

impl ChatCommands {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut commands = Self::new();
        commands.register(Box::new(Help));
        commands.register(Box::new(Motd));
        commands.register(Box::new(Users));
        commands
    }

    pub fn register(&mut self, command: Box<dyn ChatCommand>) {
        self.commands.push(command);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ChatCommand> {
        self.commands.iter().map(AsRef::as_ref)
    }

    /// Resolves and runs one command line (without the leading slash).
    pub fn dispatch(&self, ctx: &Ctx<'_>, line: &str) -> Vec<String> {
        let (name, args) = line.split_once(' ').unwrap_or((line, ""));
        match self.commands.iter().find(|c| c.name() == name) {
            None => vec![format!("unknown command: /{name}")],
            Some(command) if !command.available(ctx.conn) => {
                vec![format!("/{name} is not available here")]
            }
            Some(command) => command.run(ctx, args.trim()),
        }
    }
}

impl Default for ChatCommands {
    fn default() -> Self {
        Self::new()
    }
}

struct Help;

impl ChatCommand for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn help(&self) -> &'static str {
        "list available commands"
    }

    fn run(&self, ctx: &Ctx<'_>, _args: &str) -> Vec<String> {
        ctx.core
            .chat
            .iter()
            .filter(|c| c.available(ctx.conn))
            .map(|c| format!("/{}: {}", c.name(), c.help()))
            .collect()
    }
}

struct Motd;

impl ChatCommand for Motd {
    fn name(&self) -> &'static str {
        "motd"
    }

    fn help(&self) -> &'static str {
        "show the message of the day"
    }

    fn run(&self, ctx: &Ctx<'_>, _args: &str) -> Vec<String> {
        vec![ctx.core.options.motd.clone()]
    }
}

struct Users;

impl ChatCommand for Users {
    fn name(&self) -> &'static str {
        "users"
    }

    fn help(&self) -> &'static str {
        "list players in your room, or on the server when outside a room"
    }

    fn run(&self, ctx: &Ctx<'_>, _args: &str) -> Vec<String> {
        let room = ctx.conn.lock().room;
        let connections = match room {
            Some(room) => ctx.core.registry.room_members(room),
            None => ctx.core.registry.snapshot(),
        };
        let mut names: Vec<String> = connections
            .iter()
            .flat_map(|conn| {
                conn.lock()
                    .logged_slots()
                    .map(|slot| slot.name.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        names.sort();
        let mut lines = vec![format!("{} player(s):", names.len())];
        lines.extend(names);
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Ctx;
    use crate::server::testutil;
    use protocol::{ClientCommand, Command, Packet};

    fn chat_packet() -> Packet {
        Packet::new(
            Command::Client(ClientCommand::Chat),
            vec![("message", "/help".into())],
        )
    }

    #[test]
    fn unknown_commands_answer_with_a_hint() {
        let core = testutil::core();
        let (conn, _rx) = testutil::client(&core);
        let packet = chat_packet();
        let ctx = Ctx {
            core: &core,
            conn: &conn,
            packet: &packet,
        };
        let replies = core.chat.dispatch(&ctx, "frobnicate now");
        assert_eq!(replies, vec!["unknown command: /frobnicate".to_string()]);
    }

    #[test]
    fn help_lists_every_builtin() {
        let core = testutil::core();
        let (conn, _rx) = testutil::client(&core);
        let packet = chat_packet();
        let ctx = Ctx {
            core: &core,
            conn: &conn,
            packet: &packet,
        };
        let replies = core.chat.dispatch(&ctx, "help");
        for name in ["/help", "/motd", "/users"] {
            assert!(
                replies.iter().any(|line| line.starts_with(name)),
                "missing {name} in {replies:?}"
            );
        }
    }

    #[test]
    fn motd_echoes_the_configured_message() {
        let core = testutil::core();
        let (conn, _rx) = testutil::client(&core);
        let packet = chat_packet();
        let ctx = Ctx {
            core: &core,
            conn: &conn,
            packet: &packet,
        };
        let replies = core.chat.dispatch(&ctx, "motd");
        assert_eq!(replies, vec![core.options.motd.clone()]);
    }
}
