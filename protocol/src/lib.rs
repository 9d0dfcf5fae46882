//! Wire protocol shared by the server and its clients.
//!
//! The protocol is a self-describing packet format with two symmetric
//! encodings (length-framed binary for stream transports, flat JSON objects
//! for message transports) driven by one per-command field schema.

pub mod command;
pub mod error;
pub mod field;
pub mod packet;
pub mod schema;
pub mod value;

pub use command::{
    ClientCommand, Command, CommandScope, OnlineClientCommand, OnlineServerCommand, ServerCommand,
};
pub use error::ProtocolError;
pub use field::{FieldDef, FieldKind, FieldOpt};
pub use packet::Packet;
pub use value::{Row, Value};

/// Protocol revision advertised in hello packets.
pub const PROTOCOL_VERSION: u8 = 128;

/// Size of the length prefix on stream transports.
pub const FRAME_HEADER_LEN: usize = 4;

/// Smallest frame a peer can legally send: length prefix plus command byte.
pub const MIN_FRAME_LEN: usize = FRAME_HEADER_LEN + 1;
