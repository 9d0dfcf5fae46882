//! Closed command taxonomy, partitioned by direction and protocol layer.
//!
//! Codes 0-15 are client-originated outer commands, 128+ are
//! server-originated outer commands, and the online sub-protocol carried
//! inside the `Online` envelope uses its own 0-based numbering in each
//! direction. Unknown bytes resolve to `None` rather than an error.

/// Outer commands sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientCommand {
    Ping = 0,
    PingResponse = 1,
    Hello = 2,
    GameStart = 3,
    GameOver = 4,
    StatusUpdate = 5,
    StyleUpdate = 6,
    Chat = 7,
    SongRequest = 8,
    ScreenChange = 10,
    PlayerOptions = 11,
    Online = 12,
}

impl ClientCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Ping,
            1 => Self::PingResponse,
            2 => Self::Hello,
            3 => Self::GameStart,
            4 => Self::GameOver,
            5 => Self::StatusUpdate,
            6 => Self::StyleUpdate,
            7 => Self::Chat,
            8 => Self::SongRequest,
            10 => Self::ScreenChange,
            11 => Self::PlayerOptions,
            12 => Self::Online,
            _ => return None,
        })
    }
}

/// Outer commands sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerCommand {
    Ping = 128,
    PingResponse = 129,
    Hello = 130,
    /// Permission for every ready player in a room to start the song.
    GameStart = 131,
    GameOver = 132,
    Chat = 135,
    SongRequest = 136,
    UserList = 137,
    Online = 140,
    /// Discovery reply carrying the server name and player count.
    ServerInfo = 141,
}

impl ServerCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            128 => Self::Ping,
            129 => Self::PingResponse,
            130 => Self::Hello,
            131 => Self::GameStart,
            132 => Self::GameOver,
            135 => Self::Chat,
            136 => Self::SongRequest,
            137 => Self::UserList,
            140 => Self::Online,
            141 => Self::ServerInfo,
            _ => return None,
        })
    }
}

/// Online sub-protocol commands sent by clients inside the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OnlineClientCommand {
    Login = 0,
    EnterRoom = 1,
    CreateRoom = 2,
    RoomInfo = 3,
}

impl OnlineClientCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Login,
            1 => Self::EnterRoom,
            2 => Self::CreateRoom,
            3 => Self::RoomInfo,
            _ => return None,
        })
    }
}

/// Online sub-protocol commands sent by the server inside the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OnlineServerCommand {
    Login = 0,
    RoomUpdate = 1,
    GeneralInfo = 2,
    RoomInfo = 3,
}

impl OnlineServerCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Login,
            1 => Self::RoomUpdate,
            2 => Self::GeneralInfo,
            3 => Self::RoomInfo,
            _ => return None,
        })
    }
}

/// A command code together with its (direction, layer) partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Client(ClientCommand),
    Server(ServerCommand),
    OnlineClient(OnlineClientCommand),
    OnlineServer(OnlineServerCommand),
}

impl Command {
    /// The raw byte written on the wire for this command.
    pub fn byte(self) -> u8 {
        match self {
            Self::Client(c) => c as u8,
            Self::Server(c) => c as u8,
            Self::OnlineClient(c) => c as u8,
            Self::OnlineServer(c) => c as u8,
        }
    }

    pub fn scope(self) -> CommandScope {
        match self {
            Self::Client(_) => CommandScope::Client,
            Self::Server(_) => CommandScope::Server,
            Self::OnlineClient(_) => CommandScope::OnlineClient,
            Self::OnlineServer(_) => CommandScope::OnlineServer,
        }
    }
}

/// The partition a raw command byte is resolved in. Stream parsers pick the
/// scope from the surrounding context (a server parses client packets and
/// vice versa).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Client,
    Server,
    OnlineClient,
    OnlineServer,
}

impl CommandScope {
    /// Resolves a raw byte within this partition. Unknown bytes are "no
    /// match", never an error.
    pub fn command(self, byte: u8) -> Option<Command> {
        match self {
            Self::Client => ClientCommand::from_byte(byte).map(Command::Client),
            Self::Server => ServerCommand::from_byte(byte).map(Command::Server),
            Self::OnlineClient => OnlineClientCommand::from_byte(byte).map(Command::OnlineClient),
            Self::OnlineServer => OnlineServerCommand::from_byte(byte).map(Command::OnlineServer),
        }
    }

    /// The scope used for a nested sub-packet carried by a packet in this
    /// scope. Only the outer scopes nest; the online layer is the bottom.
    pub fn nested(self) -> CommandScope {
        match self {
            Self::Client => Self::OnlineClient,
            Self::Server => Self::OnlineServer,
            Self::OnlineClient | Self::OnlineServer => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_client_bytes_round_trip() {
        for byte in 0u8..=255 {
            if let Some(cmd) = ClientCommand::from_byte(byte) {
                assert_eq!(cmd as u8, byte);
            }
        }
    }

    #[test]
    fn reserved_client_bytes_do_not_match() {
        for byte in [9u8, 13, 14, 15, 16, 200] {
            assert_eq!(ClientCommand::from_byte(byte), None);
        }
    }

    #[test]
    fn server_codes_live_in_the_high_partition() {
        for byte in 0u8..128 {
            assert_eq!(ServerCommand::from_byte(byte), None);
        }
        assert_eq!(ServerCommand::from_byte(128), Some(ServerCommand::Ping));
    }

    #[test]
    fn scope_resolves_within_its_own_partition() {
        assert_eq!(
            CommandScope::Client.command(2),
            Some(Command::Client(ClientCommand::Hello))
        );
        assert_eq!(CommandScope::Client.command(130), None);
        assert_eq!(
            CommandScope::OnlineServer.command(1),
            Some(Command::OnlineServer(OnlineServerCommand::RoomUpdate))
        );
    }

    #[test]
    fn outer_scopes_nest_into_the_online_layer() {
        assert_eq!(CommandScope::Client.nested(), CommandScope::OnlineClient);
        assert_eq!(CommandScope::Server.nested(), CommandScope::OnlineServer);
        assert_eq!(
            CommandScope::OnlineClient.nested(),
            CommandScope::OnlineClient
        );
    }
}
