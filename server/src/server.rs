//! Server core: the shared object every transport, handler, and the
//! watcher hold. Owns the roster, the collaborator seams, and the router.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use protocol::Packet;

use crate::auth::Authenticator;
use crate::chat::ChatCommands;
use crate::connection::Connection;
use crate::handlers;
use crate::registry::Registry;
use crate::room;
use crate::router::{Ctx, Router};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Server name sent in the hello and discovery replies.
    pub name: String,
    pub motd: String,
    /// Port advertised in UDP discovery replies.
    pub advertised_port: u16,
    pub max_connections: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: "StepNet".to_string(),
            motd: "Welcome to StepNet".to_string(),
            advertised_port: 8765,
            max_connections: 255,
        }
    }
}

pub struct ServerCore {
    pub options: ServerOptions,
    pub registry: Registry,
    pub store: Arc<dyn Store>,
    pub auth: Arc<dyn Authenticator>,
    pub chat: ChatCommands,
    router: Router,
    /// Serializes dispatch across transports: handlers run to completion,
    /// one at a time, which is what lets them stage storage writes without
    /// interleaving. Never held across an await point.
    dispatch_lock: Mutex<()>,
}

impl ServerCore {
    pub fn new(
        options: ServerOptions,
        store: Arc<dyn Store>,
        auth: Arc<dyn Authenticator>,
    ) -> Arc<Self> {
        let registry = Registry::new(options.max_connections);
        Arc::new(Self {
            options,
            registry,
            store,
            auth,
            chat: ChatCommands::with_builtins(),
            router: handlers::router(),
            dispatch_lock: Mutex::new(()),
        })
    }

    /// Registers a freshly accepted connection. `false` means the server
    /// is full and the transport must drop the client.
    pub fn register(&self, conn: &Arc<Connection>) -> bool {
        if !self.registry.add(conn.clone()) {
            log::warn!(
                "rejecting connection from {}: server is full ({} clients)",
                conn.addr,
                self.options.max_connections
            );
            return false;
        }
        log::info!(
            "connection {} accepted from {} ({} online)",
            conn.token,
            conn.addr,
            self.registry.len()
        );
        true
    }

    /// Routes one decoded packet from a transport.
    pub fn dispatch(&self, conn: &Arc<Connection>, packet: &Packet) {
        let _guard = self.dispatch_guard();
        self.route(conn, packet);
    }

    /// Routing without the dispatch lock: the re-entry point for
    /// sub-packets unwrapped from the online envelope, whose outer
    /// dispatch already holds it.
    pub(crate) fn route(&self, conn: &Arc<Connection>, packet: &Packet) {
        conn.touch();
        log::trace!("{} -> {:?}", conn.addr, packet.command());
        let ctx = Ctx {
            core: self,
            conn,
            packet,
        };
        self.router.dispatch(&ctx);
    }

    /// The watcher takes this guard around its sweep so its room updates
    /// never interleave with a running handler.
    pub(crate) fn dispatch_guard(&self) -> MutexGuard<'_, ()> {
        self.dispatch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Tears a connection down. Safe to call from any transport or the
    /// watcher, any number of times; only the first call does the work.
    pub fn disconnect(&self, conn: &Arc<Connection>) {
        if !conn.begin_close() {
            return;
        }
        self.registry.remove(conn.token);
        let room = conn.lock().room;
        log::info!(
            "connection {} from {} closed ({} online)",
            conn.token,
            conn.addr,
            self.registry.len()
        );
        if let Some(room_id) = room {
            room::broadcast_user_list(self, room_id);
        }
    }
}
