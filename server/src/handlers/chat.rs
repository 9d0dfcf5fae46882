//! Chat relay and slash-command entry point.

use crate::room;
use crate::router::{Ctx, Handler};

pub struct Chat;

impl Handler for Chat {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn require_login(&self) -> bool {
        true
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()> {
        let message = ctx.packet.str("message").trim().to_string();
        if message.is_empty() {
            return Ok(());
        }

        if let Some(line) = message.strip_prefix('/') {
            for reply in ctx.core.chat.dispatch(ctx, line) {
                ctx.conn.send(room::chat_packet(reply));
            }
            return Ok(());
        }

        let (name, current_room) = {
            let state = ctx.conn.lock();
            (state.display_name().to_string(), state.room)
        };
        let relayed = room::chat_packet(format!("{name}: {message}"));
        match current_room {
            Some(room_id) => ctx.core.registry.send_to_room(room_id, &relayed),
            None => ctx.core.registry.send_to_all(&relayed),
        }
        Ok(())
    }
}
