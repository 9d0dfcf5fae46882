//! The packet type: a command plus its ordered field mapping, with
//! symmetric binary and JSON encodings driven by the schema registry.

use crate::command::{Command, CommandScope};
use crate::error::ProtocolError;
use crate::field::{BinReader, BinWriter, FieldKind};
use crate::schema;
use crate::value::{Row, Value};

/// A decoded command and field mapping, independent of transport. Packets
/// are immutable after construction; re-encode to change one.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    command: Command,
    fields: Vec<(String, Value)>,
}

impl Packet {
    /// Builds a packet for `command`, filling fields missing from `values`
    /// with their schema defaults. Unknown names are ignored. Defaults for
    /// conditional fields resolve against the fields already filled, so a
    /// defaulted packet carries the same values its own wire form decodes
    /// to.
    pub fn new(command: Command, values: Vec<(&str, Value)>) -> Packet {
        let mut fields: Vec<(String, Value)> = Vec::new();
        for def in schema::fields(command) {
            let value = values
                .iter()
                .find(|(name, _)| *name == def.name)
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| def.kind.resolved_default(&fields));
            fields.push((def.name.to_string(), value));
        }
        Packet { command, fields }
    }

    /// A packet with every field at its default.
    pub fn empty(command: Command) -> Packet {
        Packet::new(command, Vec::new())
    }

    /// Wraps an online sub-packet in its outer envelope.
    pub fn envelope(outer: Command, inner: Packet) -> Packet {
        Packet::new(outer, vec![("packet", Value::from(inner))])
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Integer field accessor; absent or non-integer fields read as zero.
    pub fn int(&self, name: &str) -> u64 {
        self.get(name).map(Value::as_int).unwrap_or(0)
    }

    /// String field accessor; absent or non-string fields read as empty.
    pub fn str(&self, name: &str) -> &str {
        self.get(name).map(Value::as_str).unwrap_or("")
    }

    pub fn nested(&self, name: &str) -> Option<&Packet> {
        self.get(name).and_then(Value::as_packet)
    }

    /// The logical packet bytes: command byte followed by the encoded
    /// payload. The length prefix is transport framing, not part of this.
    pub fn payload(&self) -> Vec<u8> {
        let mut w = BinWriter::new();
        w.raw(&[self.command.byte()]);
        for (def, (_, value)) in schema::fields(self.command).iter().zip(&self.fields) {
            def.kind.encode(&mut w, value, &self.fields);
        }
        w.finish()
    }

    /// The framed wire form for stream transports:
    /// `u32_be(1 + payload_len) ++ command_byte ++ payload`.
    pub fn frame(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        frame
    }

    /// Decodes `command_byte ++ payload` within the given scope.
    ///
    /// Unknown commands yield `Ok(None)` so the taxonomy can grow without
    /// breaking old peers; only truncation is an error.
    pub fn parse(scope: CommandScope, bytes: &[u8]) -> Result<Option<Packet>, ProtocolError> {
        let Some((&command_byte, payload)) = bytes.split_first() else {
            return Err(ProtocolError::ShortFrame);
        };
        let Some(command) = scope.command(command_byte) else {
            return Ok(None);
        };

        let mut r = BinReader::new(payload);
        let mut fields: Vec<(String, Value)> = Vec::new();
        for def in schema::fields(command) {
            let value = def.kind.decode(&mut r, def.name, &fields, scope.nested())?;
            fields.push((def.name.to_string(), value));
        }
        Ok(Some(Packet { command, fields }))
    }

    /// JSON wire form: a flat object with a numeric `_command` key plus one
    /// key per declared field. Absent conditional fields are omitted.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("_command".to_string(), self.command.byte().into());
        for (name, value) in &self.fields {
            if let Some(json) = value.to_json() {
                obj.insert(name.clone(), json);
            }
        }
        serde_json::Value::Object(obj)
    }

    /// Decodes one JSON object within the given scope. Missing fields take
    /// their schema defaults; unknown commands yield `Ok(None)`.
    pub fn from_json(
        scope: CommandScope,
        json: &serde_json::Value,
    ) -> Result<Option<Packet>, ProtocolError> {
        let obj = json
            .as_object()
            .ok_or(ProtocolError::Json("expected an object"))?;
        let command_byte = obj
            .get("_command")
            .and_then(serde_json::Value::as_u64)
            .ok_or(ProtocolError::Json("missing numeric `_command`"))?;
        if command_byte > u8::MAX as u64 {
            return Ok(None);
        }
        let Some(command) = scope.command(command_byte as u8) else {
            return Ok(None);
        };

        let mut fields: Vec<(String, Value)> = Vec::new();
        for def in schema::fields(command) {
            let value = field_from_json(&def.kind, obj.get(def.name), &fields, scope.nested())?;
            fields.push((def.name.to_string(), value));
        }
        Ok(Some(Packet { command, fields }))
    }
}

fn field_from_json(
    kind: &FieldKind,
    json: Option<&serde_json::Value>,
    decoded: &[(String, Value)],
    nested: CommandScope,
) -> Result<Value, ProtocolError> {
    let Some(json) = json else {
        return Ok(kind.resolved_default(decoded));
    };
    Ok(match kind {
        FieldKind::Int { .. } | FieldKind::Msn | FieldKind::Lsn => {
            Value::Int(json.as_u64().unwrap_or(0))
        }
        FieldKind::Str => Value::Str(json.as_str().unwrap_or("").to_string()),
        FieldKind::StrList { .. } => Value::StrList(
            json.as_array()
                .map(|items| {
                    items
                        .iter()
                        .map(|item| item.as_str().unwrap_or("").to_string())
                        .collect()
                })
                .unwrap_or_default(),
        ),
        FieldKind::IntList { .. } => Value::IntList(
            json.as_array()
                .map(|items| items.iter().map(|item| item.as_u64().unwrap_or(0)).collect())
                .unwrap_or_default(),
        ),
        FieldKind::Records { schema, .. } => {
            let mut rows: Vec<Row> = Vec::new();
            for item in json.as_array().map(Vec::as_slice).unwrap_or(&[]) {
                let obj = item.as_object();
                let mut row: Row = Vec::with_capacity(schema.len());
                for def in *schema {
                    let value = field_from_json(
                        &def.kind,
                        obj.and_then(|obj| obj.get(def.name)),
                        &row,
                        nested,
                    )?;
                    row.push((def.name.to_string(), value));
                }
                rows.push(row);
            }
            Value::Records(rows)
        }
        FieldKind::Select { on, arms } => {
            let selector = decoded
                .iter()
                .find(|(name, _)| name == on)
                .map(|(_, value)| value.as_int())
                .unwrap_or(0);
            match arms.iter().find(|(key, _)| *key == selector) {
                Some((_, arm)) => field_from_json(arm, Some(json), decoded, nested)?,
                None => Value::Absent,
            }
        }
        FieldKind::Packet => match Packet::from_json(nested, json)? {
            Some(packet) => Value::Packet(Box::new(packet)),
            None => Value::Absent,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ClientCommand, OnlineServerCommand, ServerCommand};

    fn round_trip(packet: &Packet, scope: CommandScope) {
        let decoded = Packet::parse(scope, &packet.payload())
            .expect("binary decode")
            .expect("known command");
        assert_eq!(&decoded, packet, "binary round-trip");

        let json = packet.to_json();
        let decoded = Packet::from_json(scope, &json)
            .expect("json decode")
            .expect("known command");
        assert_eq!(&decoded, packet, "json round-trip");
    }

    #[test]
    fn hello_round_trips() {
        let packet = Packet::new(
            Command::Client(ClientCommand::Hello),
            vec![("version", 128u8.into()), ("name", "StepMania".into())],
        );
        round_trip(&packet, CommandScope::Client);
    }

    #[test]
    fn hello_wire_bytes() {
        let packet = Packet::new(
            Command::Client(ClientCommand::Hello),
            vec![("version", 128u8.into()), ("name", "X".into())],
        );
        assert_eq!(packet.frame(), vec![0, 0, 0, 4, 2, 0x80, b'X', 0]);
    }

    #[test]
    fn empty_fields_and_max_integers_round_trip() {
        let packet = Packet::new(
            Command::Server(ServerCommand::Hello),
            vec![
                ("version", 255u8.into()),
                ("name", "".into()),
                ("key", u32::MAX.into()),
            ],
        );
        round_trip(&packet, CommandScope::Server);
        assert_eq!(packet.int("key"), u32::MAX as u64);
    }

    #[test]
    fn nibble_fields_round_trip_through_a_real_schema() {
        for feet in 0u64..16 {
            let packet = Packet::new(
                Command::Client(ClientCommand::GameStart),
                vec![
                    ("primary_feet", feet.into()),
                    ("secondary_feet", (15 - feet).into()),
                    ("primary_difficulty", 3u8.into()),
                    ("secondary_difficulty", 4u8.into()),
                    ("start_position", 1u8.into()),
                    ("title", "Flight".into()),
                    ("artist", "Nobody".into()),
                ],
            );
            let decoded = Packet::parse(CommandScope::Client, &packet.payload())
                .unwrap()
                .unwrap();
            assert_eq!(decoded.int("primary_feet"), feet);
            assert_eq!(decoded.int("secondary_feet"), 15 - feet);
            assert_eq!(decoded.str("title"), "Flight");
        }
    }

    #[test]
    fn user_list_records_round_trip() {
        let players = Value::Records(vec![
            vec![
                ("status".to_string(), Value::Int(1)),
                ("name".to_string(), Value::Str("alice".to_string())),
            ],
            vec![
                ("status".to_string(), Value::Int(0)),
                ("name".to_string(), Value::Str("bob".to_string())),
            ],
        ]);
        let packet = Packet::new(
            Command::Server(ServerCommand::UserList),
            vec![
                ("max_players", 255u8.into()),
                ("player_count", 2u8.into()),
                ("players", players),
            ],
        );
        round_trip(&packet, CommandScope::Server);
    }

    #[test]
    fn room_update_list_round_trips_with_conditional_fields() {
        let packet = Packet::new(
            Command::OnlineServer(OnlineServerCommand::RoomUpdate),
            vec![
                ("kind", 1u8.into()),
                ("room_count", 2u8.into()),
                (
                    "names",
                    vec!["first".to_string(), "second".to_string()].into(),
                ),
                ("descriptions", vec![String::new(), "casual".to_string()].into()),
                ("statuses", vec![0u64, 2].into()),
                ("flags", vec![1u64, 0].into()),
            ],
        );
        round_trip(&packet, CommandScope::OnlineServer);

        // The kind-0 arms must not appear on the wire at all.
        let decoded = Packet::parse(CommandScope::OnlineServer, &packet.payload())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.get("title"), Some(&Value::Absent));
    }

    #[test]
    fn defaulted_conditional_fields_survive_the_wire() {
        // `kind` defaults to 0, so the kind-0 arms must default to their
        // arm values, not to absent: an absent arm encodes its default
        // bytes and would decode to a different packet.
        let packet = Packet::empty(Command::OnlineServer(OnlineServerCommand::RoomUpdate));
        assert_eq!(packet.get("title"), Some(&Value::Str(String::new())));
        assert_eq!(packet.get("room_kind"), Some(&Value::Int(0)));
        assert_eq!(packet.get("room_count"), Some(&Value::Absent));
        round_trip(&packet, CommandScope::OnlineServer);
    }

    /// A value each field kind can carry, with `fill` driving every
    /// integer so counted lists and their count fields stay consistent.
    fn representative(
        kind: &FieldKind,
        built: &[(String, Value)],
        nested: CommandScope,
        fill: u64,
    ) -> Value {
        match kind {
            FieldKind::Int { .. } | FieldKind::Msn | FieldKind::Lsn => Value::Int(fill),
            FieldKind::Str => Value::Str("sample".to_string()),
            FieldKind::StrList { .. } => Value::StrList(
                (0..fill)
                    .map(|i| if i == 1 { String::new() } else { format!("s{i}") })
                    .collect(),
            ),
            FieldKind::IntList { .. } => Value::IntList((0..fill).collect()),
            FieldKind::Records { schema, .. } => {
                let mut rows: Vec<Row> = Vec::new();
                for _ in 0..fill {
                    let mut row: Row = Vec::new();
                    for def in *schema {
                        let value = representative(&def.kind, &row, nested, fill);
                        row.push((def.name.to_string(), value));
                    }
                    rows.push(row);
                }
                Value::Records(rows)
            }
            FieldKind::Select { on, arms } => {
                let selector = built
                    .iter()
                    .find(|(name, _)| name == on)
                    .map(|(_, value)| value.as_int())
                    .unwrap_or(0);
                match arms.iter().find(|(key, _)| *key == selector) {
                    Some((_, arm)) => representative(arm, built, nested, fill),
                    None => Value::Absent,
                }
            }
            FieldKind::Packet => {
                let inner = (0..=255u8)
                    .find_map(|byte| nested.command(byte))
                    .expect("nested scope has commands");
                Value::Packet(Box::new(filled(inner, fill)))
            }
        }
    }

    fn filled(command: Command, fill: u64) -> Packet {
        let mut built: Vec<(String, Value)> = Vec::new();
        for def in schema::fields(command) {
            let value = representative(&def.kind, &built, command.scope().nested(), fill);
            built.push((def.name.to_string(), value));
        }
        let values = schema::fields(command)
            .iter()
            .zip(built)
            .map(|(def, (_, value))| (def.name, value))
            .collect();
        Packet::new(command, values)
    }

    #[test]
    fn every_registered_command_round_trips_in_both_encodings() {
        for scope in [
            CommandScope::Client,
            CommandScope::Server,
            CommandScope::OnlineClient,
            CommandScope::OnlineServer,
        ] {
            for byte in 0u8..=255 {
                let Some(command) = scope.command(byte) else {
                    continue;
                };
                // fill 0 covers empty lists and the default select arms;
                // fill 2 covers counted lists and unmatched selectors.
                for fill in [0u64, 2] {
                    round_trip(&filled(command, fill), scope);
                }
            }
        }
    }

    #[test]
    fn room_update_entry_round_trips() {
        let packet = Packet::new(
            Command::OnlineServer(OnlineServerCommand::RoomUpdate),
            vec![
                ("kind", 0u8.into()),
                ("title", "my room".into()),
                ("description", "friends only".into()),
                ("room_kind", 1u8.into()),
            ],
        );
        round_trip(&packet, CommandScope::OnlineServer);
    }

    #[test]
    fn game_over_reference_counted_lists_round_trip() {
        let packet = Packet::new(
            Command::Server(ServerCommand::GameOver),
            vec![
                ("player_count", 2u8.into()),
                ("placements", vec![0u64, 1].into()),
                ("scores", vec![987_654u64, 12_345].into()),
                ("combos", vec![212u64, 48].into()),
                ("grades", vec![2u64, 5].into()),
                ("names", vec!["alice".to_string(), "bob".to_string()].into()),
            ],
        );
        round_trip(&packet, CommandScope::Server);
    }

    #[test]
    fn online_envelope_nests_one_level() {
        let inner = Packet::new(
            Command::OnlineServer(OnlineServerCommand::Login),
            vec![("status", 0u8.into()), ("text", "welcome".into())],
        );
        let outer = Packet::envelope(Command::Server(ServerCommand::Online), inner.clone());
        round_trip(&outer, CommandScope::Server);

        let decoded = Packet::parse(CommandScope::Server, &outer.payload())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.nested("packet"), Some(&inner));
    }

    #[test]
    fn unknown_command_decodes_to_no_packet() {
        // 9 is a reserved client code, 200 is unassigned on the server side.
        assert_eq!(Packet::parse(CommandScope::Client, &[9, 0, 0]).unwrap(), None);
        assert_eq!(Packet::parse(CommandScope::Server, &[200]).unwrap(), None);
    }

    #[test]
    fn unknown_nested_command_is_tolerated() {
        // Envelope carrying an inner frame with an unregistered command.
        let mut payload = vec![ClientCommand::Online as u8];
        payload.extend_from_slice(&3u32.to_be_bytes());
        payload.extend_from_slice(&[200, 1, 2]);
        let packet = Packet::parse(CommandScope::Client, &payload)
            .unwrap()
            .unwrap();
        assert_eq!(packet.get("packet"), Some(&Value::Absent));
    }

    #[test]
    fn truncated_payload_is_an_error_not_a_panic() {
        // Server hello declares a 4-byte key; give it one byte.
        let payload = [ServerCommand::Hello as u8, 1, b'a', 0, 7];
        assert!(Packet::parse(CommandScope::Server, &payload).is_err());
    }

    #[test]
    fn json_defaults_missing_fields() {
        let json: serde_json::Value =
            serde_json::from_str(&format!("{{\"_command\": {}}}", ClientCommand::Hello as u8))
                .unwrap();
        let packet = Packet::from_json(CommandScope::Client, &json)
            .unwrap()
            .unwrap();
        assert_eq!(packet.int("version"), 0);
        assert_eq!(packet.str("name"), "");
    }

    #[test]
    fn json_unknown_command_is_no_packet() {
        let json = serde_json::json!({ "_command": 99 });
        assert_eq!(Packet::from_json(CommandScope::Client, &json).unwrap(), None);
    }
}
