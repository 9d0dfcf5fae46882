//! Transport layer: four ways onto the same router.
//!
//! Each transport turns its I/O model into complete packets and feeds
//! them to [`ServerCore::dispatch`]; outbound packets flow back through
//! the connection's queue. Malformed input is logged and dropped at this
//! boundary so nothing undecodable reaches a handler.

pub mod blocking_tcp;
pub mod frame;
pub mod tcp;
pub mod udp;
pub mod ws;

use std::sync::Arc;

use protocol::{CommandScope, Packet};

use crate::connection::Connection;
use crate::server::ServerCore;

/// Routes one binary frame (`command_byte ++ payload`, length prefix
/// already stripped).
pub(crate) fn dispatch_frame(core: &ServerCore, conn: &Arc<Connection>, frame: &[u8]) {
    match Packet::parse(CommandScope::Client, frame) {
        Ok(Some(packet)) => core.dispatch(conn, &packet),
        Ok(None) => log::debug!(
            "unknown command byte {} from {}, ignoring",
            frame.first().copied().unwrap_or(0),
            conn.addr
        ),
        Err(err) => log::warn!("malformed frame from {}: {err}", conn.addr),
    }
}

/// Routes one JSON text message.
pub(crate) fn dispatch_json(core: &ServerCore, conn: &Arc<Connection>, text: &str) {
    let json: serde_json::Value = match serde_json::from_str(text) {
        Ok(json) => json,
        Err(err) => {
            log::warn!("undecodable json from {}: {err}", conn.addr);
            return;
        }
    };
    match Packet::from_json(CommandScope::Client, &json) {
        Ok(Some(packet)) => core.dispatch(conn, &packet),
        Ok(None) => log::debug!("unknown json command from {}, ignoring", conn.addr),
        Err(err) => log::warn!("malformed json packet from {}: {err}", conn.addr),
    }
}
