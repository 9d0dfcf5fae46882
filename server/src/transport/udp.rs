//! Connectionless UDP transport, restricted to discovery.
//!
//! One datagram is one framed packet. Only the handshake commands are
//! accepted; everything else is dropped, since UDP peers have no session
//! to attach state to. Replies go straight back to the source address.

use std::sync::Arc;
use std::time::Duration;

use protocol::{
    ClientCommand, Command, CommandScope, Packet, ServerCommand, MIN_FRAME_LEN,
};
use tokio::net::UdpSocket;

use crate::server::ServerCore;

const ALLOWED: &[ClientCommand] = &[ClientCommand::Ping, ClientCommand::Hello];

pub async fn serve(core: Arc<ServerCore>, socket: UdpSocket) {
    let mut buf = [0u8; 2048];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                log::error!("udp receive failed: {err}");
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };
        if len < MIN_FRAME_LEN {
            log::debug!("udp datagram from {addr} below minimum frame size, ignoring");
            continue;
        }

        let mut header = [0u8; 4];
        header.copy_from_slice(&buf[..4]);
        let declared = u32::from_be_bytes(header) as usize;
        let end = (4 + declared).min(len);

        match Packet::parse(CommandScope::Client, &buf[4..end]) {
            Ok(Some(packet)) => {
                let Command::Client(command) = packet.command() else {
                    continue;
                };
                if !ALLOWED.contains(&command) {
                    log::debug!("udp command {command:?} from {addr} not allowed, ignoring");
                    continue;
                }
                let reply = match command {
                    ClientCommand::Ping => {
                        Packet::empty(Command::Server(ServerCommand::PingResponse))
                    }
                    _ => server_info(&core),
                };
                if let Err(err) = socket.send_to(&reply.frame(), addr).await {
                    log::debug!("udp reply to {addr} failed: {err}");
                }
            }
            Ok(None) => log::debug!("unknown udp command from {addr}, ignoring"),
            Err(err) => log::warn!("malformed udp datagram from {addr}: {err}"),
        }
    }
}

/// Discovery reply: who we are and how busy we are.
fn server_info(core: &ServerCore) -> Packet {
    Packet::new(
        Command::Server(ServerCommand::ServerInfo),
        vec![
            ("name", core.options.name.as_str().into()),
            ("port", core.options.advertised_port.into()),
            ("player_count", (core.registry.len() as u64).into()),
        ],
    )
}
