//! Command handlers, grouped by concern, and the router wiring that binds
//! each command to its handler.

pub mod chat;
pub mod game;
pub mod online;
pub mod session;

use protocol::{ClientCommand, Command, OnlineClientCommand};

use crate::router::Router;

/// Builds the routing table for every client command the server answers.
pub fn router() -> Router {
    let mut router = Router::new();

    router.register(Command::Client(ClientCommand::Ping), Box::new(session::Ping));
    router.register(
        Command::Client(ClientCommand::PingResponse),
        Box::new(session::PingAck),
    );
    router.register(Command::Client(ClientCommand::Hello), Box::new(session::Hello));
    router.register(
        Command::Client(ClientCommand::ScreenChange),
        Box::new(session::ScreenChange),
    );
    router.register(
        Command::Client(ClientCommand::StyleUpdate),
        Box::new(session::StyleUpdate),
    );
    router.register(
        Command::Client(ClientCommand::PlayerOptions),
        Box::new(session::PlayerOptions),
    );

    router.register(Command::Client(ClientCommand::Chat), Box::new(chat::Chat));

    router.register(
        Command::Client(ClientCommand::SongRequest),
        Box::new(game::SongRequest),
    );
    router.register(
        Command::Client(ClientCommand::GameStart),
        Box::new(game::GameStart),
    );
    router.register(
        Command::Client(ClientCommand::StatusUpdate),
        Box::new(game::StatusUpdate),
    );
    router.register(
        Command::Client(ClientCommand::GameOver),
        Box::new(game::GameOver),
    );

    router.register(
        Command::Client(ClientCommand::Online),
        Box::new(online::Envelope),
    );
    router.register(
        Command::OnlineClient(OnlineClientCommand::Login),
        Box::new(online::Login),
    );
    router.register(
        Command::OnlineClient(OnlineClientCommand::EnterRoom),
        Box::new(online::EnterRoom),
    );
    router.register(
        Command::OnlineClient(OnlineClientCommand::CreateRoom),
        Box::new(online::CreateRoom),
    );
    router.register(
        Command::OnlineClient(OnlineClientCommand::RoomInfo),
        Box::new(online::RoomInfo),
    );

    router
}
