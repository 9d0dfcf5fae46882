//! Table-driven command dispatch.
//!
//! Commands map to one or more handlers, run in registration order.
//! Handlers are synchronous and run to completion; their storage writes
//! are staged, committed on success, and rolled back on failure so one
//! bad packet never poisons shared state or other connections.

use std::collections::HashMap;
use std::sync::Arc;

use protocol::{Command, Packet};

use crate::connection::Connection;
use crate::server::ServerCore;
use crate::store::Store;

/// Everything a handler may touch while processing one packet.
pub struct Ctx<'a> {
    pub core: &'a ServerCore,
    pub conn: &'a Arc<Connection>,
    pub packet: &'a Packet,
}

pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Commands gated on a completed login. Packets that fail the gate are
    /// dropped with a log line; the connection stays open.
    fn require_login(&self) -> bool {
        false
    }

    fn handle(&self, ctx: &Ctx<'_>) -> anyhow::Result<()>;
}

pub struct Router {
    handlers: HashMap<Command, Vec<Box<dyn Handler>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Appends a handler for the command. Multiple handlers per command
    /// run in registration order.
    pub fn register(&mut self, command: Command, handler: Box<dyn Handler>) {
        self.handlers.entry(command).or_default().push(handler);
    }

    /// Routes one decoded packet. Unhandled commands and precondition
    /// failures are logged and dropped; a handler error is contained to
    /// that handler, and its staged writes are rolled back before the
    /// next handler runs. Writes of a successful handler commit before
    /// the next, so handlers observe each other's committed state.
    pub fn dispatch(&self, ctx: &Ctx<'_>) {
        let command = ctx.packet.command();
        let Some(handlers) = self.handlers.get(&command) else {
            log::debug!("no handler for {command:?}, dropping packet from {}", ctx.conn.addr);
            return;
        };
        for handler in handlers {
            if handler.require_login() && !ctx.conn.lock().is_logged_in() {
                log::debug!(
                    "{} from {} requires login, skipping",
                    handler.name(),
                    ctx.conn.addr
                );
                continue;
            }
            match handler.handle(ctx) {
                Ok(()) => ctx.core.store.commit(),
                Err(err) => {
                    log::warn!(
                        "handler {} failed for {}: {err:#}",
                        handler.name(),
                        ctx.conn.addr
                    );
                    ctx.core.store.rollback();
                }
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
