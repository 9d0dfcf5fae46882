//! Per-command field schemas.
//!
//! One explicit registry, populated at compile time, with no reliance on
//! type introspection: every command in the taxonomy maps to exactly one
//! ordered field list, and that list drives both encode and decode for the
//! binary and JSON wire forms.

use crate::command::{
    ClientCommand, Command, OnlineClientCommand, OnlineServerCommand, ServerCommand,
};
use crate::field::{FieldDef, FieldKind, FieldOpt};

const fn int(name: &'static str, width: usize) -> FieldDef {
    FieldDef::new(name, FieldKind::Int { width })
}

const fn msn(name: &'static str) -> FieldDef {
    FieldDef::new(name, FieldKind::Msn)
}

const fn lsn(name: &'static str) -> FieldDef {
    FieldDef::new(name, FieldKind::Lsn)
}

const fn text(name: &'static str) -> FieldDef {
    FieldDef::new(name, FieldKind::Str)
}

const EMPTY: &[FieldDef] = &[];

const CLIENT_HELLO: &[FieldDef] = &[int("version", 1), text("name")];

const SERVER_HELLO: &[FieldDef] = &[int("version", 1), text("name"), int("key", 4)];

const CLIENT_GAME_START: &[FieldDef] = &[
    msn("primary_feet"),
    lsn("secondary_feet"),
    msn("primary_difficulty"),
    lsn("secondary_difficulty"),
    msn("start_position"),
    lsn("reserved"),
    text("title"),
    text("subtitle"),
    text("artist"),
    text("course"),
    text("song_options"),
    text("primary_options"),
    text("secondary_options"),
];

const CLIENT_STATUS_UPDATE: &[FieldDef] = &[
    msn("player_id"),
    lsn("step_kind"),
    msn("projected_grade"),
    lsn("reserved"),
    int("score", 4),
    int("combo", 2),
    int("health", 2),
    int("offset", 2),
];

const CLIENT_STYLE_UPDATE: &[FieldDef] = &[
    int("player_count", 1),
    int("player_id", 1),
    text("player_name"),
];

const CHAT: &[FieldDef] = &[text("message")];

const SONG_REQUEST: &[FieldDef] = &[
    int("usage", 1),
    text("title"),
    text("subtitle"),
    text("artist"),
];

const SERVER_GAME_OVER: &[FieldDef] = &[
    int("player_count", 1),
    FieldDef::new(
        "placements",
        FieldKind::IntList {
            width: 1,
            count: FieldOpt::Ref("player_count"),
        },
    ),
    FieldDef::new(
        "scores",
        FieldKind::IntList {
            width: 4,
            count: FieldOpt::Ref("player_count"),
        },
    ),
    FieldDef::new(
        "combos",
        FieldKind::IntList {
            width: 2,
            count: FieldOpt::Ref("player_count"),
        },
    ),
    FieldDef::new(
        "grades",
        FieldKind::IntList {
            width: 1,
            count: FieldOpt::Ref("player_count"),
        },
    ),
    FieldDef::new("names", FieldKind::StrList { count: Some(FieldOpt::Ref("player_count")) }),
];

const USER_ENTRY: &[FieldDef] = &[int("status", 1), text("name")];

const SERVER_USER_LIST: &[FieldDef] = &[
    int("max_players", 1),
    int("player_count", 1),
    FieldDef::new(
        "players",
        FieldKind::Records {
            count_field: "player_count",
            schema: USER_ENTRY,
        },
    ),
];

const CLIENT_SCREEN_CHANGE: &[FieldDef] = &[int("status", 1)];

const CLIENT_PLAYER_OPTIONS: &[FieldDef] = &[text("player_0"), text("player_1")];

const ONLINE_ENVELOPE: &[FieldDef] = &[FieldDef::new("packet", FieldKind::Packet)];

const SERVER_INFO: &[FieldDef] = &[text("name"), int("port", 2), int("player_count", 2)];

const ONLINE_LOGIN: &[FieldDef] = &[
    int("player_number", 1),
    int("method", 1),
    text("username"),
    text("password"),
];

const ONLINE_LOGIN_REPLY: &[FieldDef] = &[int("status", 1), text("text")];

const ONLINE_ENTER_ROOM: &[FieldDef] = &[int("enter", 1), text("name"), text("password")];

const ONLINE_CREATE_ROOM: &[FieldDef] = &[
    int("kind", 1),
    text("title"),
    text("description"),
    text("password"),
];

const ONLINE_ROOM_INFO_REQUEST: &[FieldDef] = &[text("name")];

// kind 0 announces the room just entered; kind 1 carries the room list.
const ONLINE_ROOM_UPDATE: &[FieldDef] = &[
    int("kind", 1),
    FieldDef::new(
        "title",
        FieldKind::Select {
            on: "kind",
            arms: &[(0, FieldKind::Str)],
        },
    ),
    FieldDef::new(
        "description",
        FieldKind::Select {
            on: "kind",
            arms: &[(0, FieldKind::Str)],
        },
    ),
    FieldDef::new(
        "room_kind",
        FieldKind::Select {
            on: "kind",
            arms: &[(0, FieldKind::Int { width: 1 })],
        },
    ),
    FieldDef::new(
        "room_count",
        FieldKind::Select {
            on: "kind",
            arms: &[(1, FieldKind::Int { width: 1 })],
        },
    ),
    FieldDef::new(
        "names",
        FieldKind::Select {
            on: "kind",
            arms: &[(
                1,
                FieldKind::StrList {
                    count: Some(FieldOpt::Ref("room_count")),
                },
            )],
        },
    ),
    FieldDef::new(
        "descriptions",
        FieldKind::Select {
            on: "kind",
            arms: &[(
                1,
                FieldKind::StrList {
                    count: Some(FieldOpt::Ref("room_count")),
                },
            )],
        },
    ),
    FieldDef::new(
        "statuses",
        FieldKind::Select {
            on: "kind",
            arms: &[(
                1,
                FieldKind::IntList {
                    width: 1,
                    count: FieldOpt::Ref("room_count"),
                },
            )],
        },
    ),
    FieldDef::new(
        "flags",
        FieldKind::Select {
            on: "kind",
            arms: &[(
                1,
                FieldKind::IntList {
                    width: 1,
                    count: FieldOpt::Ref("room_count"),
                },
            )],
        },
    ),
];

const ONLINE_GENERAL_INFO: &[FieldDef] = &[int("format", 1)];

const ONLINE_ROOM_INFO: &[FieldDef] = &[
    text("song_title"),
    text("song_subtitle"),
    text("song_artist"),
    int("player_count", 1),
    int("max_players", 1),
    FieldDef::new(
        "players",
        FieldKind::StrList {
            count: Some(FieldOpt::Ref("player_count")),
        },
    ),
];

/// The ordered field list for a command. Total over the taxonomy: a byte
/// that resolved to a `Command` always has a schema.
pub fn fields(command: Command) -> &'static [FieldDef] {
    match command {
        Command::Client(cmd) => match cmd {
            ClientCommand::Ping => EMPTY,
            ClientCommand::PingResponse => EMPTY,
            ClientCommand::Hello => CLIENT_HELLO,
            ClientCommand::GameStart => CLIENT_GAME_START,
            ClientCommand::GameOver => EMPTY,
            ClientCommand::StatusUpdate => CLIENT_STATUS_UPDATE,
            ClientCommand::StyleUpdate => CLIENT_STYLE_UPDATE,
            ClientCommand::Chat => CHAT,
            ClientCommand::SongRequest => SONG_REQUEST,
            ClientCommand::ScreenChange => CLIENT_SCREEN_CHANGE,
            ClientCommand::PlayerOptions => CLIENT_PLAYER_OPTIONS,
            ClientCommand::Online => ONLINE_ENVELOPE,
        },
        Command::Server(cmd) => match cmd {
            ServerCommand::Ping => EMPTY,
            ServerCommand::PingResponse => EMPTY,
            ServerCommand::Hello => SERVER_HELLO,
            ServerCommand::GameStart => EMPTY,
            ServerCommand::GameOver => SERVER_GAME_OVER,
            ServerCommand::Chat => CHAT,
            ServerCommand::SongRequest => SONG_REQUEST,
            ServerCommand::UserList => SERVER_USER_LIST,
            ServerCommand::Online => ONLINE_ENVELOPE,
            ServerCommand::ServerInfo => SERVER_INFO,
        },
        Command::OnlineClient(cmd) => match cmd {
            OnlineClientCommand::Login => ONLINE_LOGIN,
            OnlineClientCommand::EnterRoom => ONLINE_ENTER_ROOM,
            OnlineClientCommand::CreateRoom => ONLINE_CREATE_ROOM,
            OnlineClientCommand::RoomInfo => ONLINE_ROOM_INFO_REQUEST,
        },
        Command::OnlineServer(cmd) => match cmd {
            OnlineServerCommand::Login => ONLINE_LOGIN_REPLY,
            OnlineServerCommand::RoomUpdate => ONLINE_ROOM_UPDATE,
            OnlineServerCommand::GeneralInfo => ONLINE_GENERAL_INFO,
            OnlineServerCommand::RoomInfo => ONLINE_ROOM_INFO,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_counts_follow_their_count_field() {
        // Every Ref option must point at a field declared earlier in the
        // same schema, otherwise it can never resolve at decode time.
        fn check(schema: &[FieldDef]) {
            let mut seen: Vec<&str> = Vec::new();
            for def in schema {
                let refs: Vec<&str> = match def.kind {
                    FieldKind::IntList {
                        count: FieldOpt::Ref(name),
                        ..
                    } => vec![name],
                    FieldKind::StrList {
                        count: Some(FieldOpt::Ref(name)),
                    } => vec![name],
                    FieldKind::Records { count_field, .. } => vec![count_field],
                    FieldKind::Select { on, .. } => vec![on],
                    _ => vec![],
                };
                for name in refs {
                    assert!(
                        seen.contains(&name),
                        "field `{}` references `{name}` before it is decoded",
                        def.name
                    );
                }
                seen.push(def.name);
            }
        }

        check(SERVER_GAME_OVER);
        check(SERVER_USER_LIST);
        check(ONLINE_ROOM_UPDATE);
        check(ONLINE_ROOM_INFO);
    }
}
