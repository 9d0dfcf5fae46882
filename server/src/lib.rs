//! # Rhythm-Game Multiplayer Server Library
//!
//! This library provides the authoritative server implementation for the
//! rhythm-game network protocol. It accepts clients over four transports,
//! decodes their packets into a single command stream, and coordinates the
//! shared state that makes multiplayer play work: logins, rooms, chat, and
//! the synchronized song start.
//!
//! ## Core Responsibilities
//!
//! ### Protocol Dispatch
//! Every complete packet, regardless of the transport it arrived on, flows
//! through one router that enforces login preconditions and isolates handler
//! failures to the packet that caused them.
//!
//! ### Connection Management
//! Handles the complete lifecycle of client connections including:
//! - Registration against a configurable capacity limit
//! - Outbound delivery through per-connection queues
//! - Idle timeout detection and cleanup
//! - Idempotent teardown shared by all transports
//!
//! ### Room Synchronization
//! Rooms gate the song-start barrier: a round begins when every
//! participating player reports ready, or when a waiting player has been
//! held for longer than the forced-start grace period.
//!
//! ## Module Organization
//!
//! ### Transport Module (`transport`)
//! Framing and I/O for the four connection models:
//! - Async TCP with length-prefixed frames
//! - Blocking thread-per-connection TCP with the same framing
//! - WebSocket, where each message is one packet (binary or JSON)
//! - Connectionless UDP restricted to the discovery handshake
//!
//! ### Router and Handlers (`router`, `handlers`)
//! Table-driven command dispatch. Handlers are synchronous and run to
//! completion; a handler error rolls back its staged storage writes and
//! never disturbs other connections.
//!
//! ### Rooms and the Watcher (`room`, `watcher`)
//! Room state transitions, broadcast packet builders, and the periodic
//! task that releases the song-start barrier and reaps idle connections.
//!
//! ### Collaborators (`store`, `auth`, `chat`)
//! Trait seams for keyed-record storage, authentication, and operator
//! chat commands, each with the reference implementation the binary uses.

pub mod auth;
pub mod chat;
pub mod connection;
pub mod handlers;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod store;
pub mod transport;
pub mod watcher;
